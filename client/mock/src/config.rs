use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::anyhow;
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let sweep_secs: u64 = try_load("ESCALATION_SWEEP_SECS", "3600")?;

        Ok(Self {
            port: try_load("RUST_PORT", "8080")?,
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");

            anyhow!("Environment misconfigured: {key}: {e}")
        })
}
