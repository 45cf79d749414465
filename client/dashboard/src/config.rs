use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};
use url::Url;

use crate::error::{AppError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_MS: &str = "5000";
pub const DEFAULT_SESSION_DIR: &str = ".gramalert";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub ws_url: Url,
    pub reconnect_delay: Duration,
    pub session_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url: Url = try_load("GRAMALERT_API_URL", DEFAULT_API_URL)?;

        let ws_url = match var("GRAMALERT_WS_URL") {
            Ok(raw) => parse("GRAMALERT_WS_URL", &raw)?,
            Err(()) => socket_url(&api_url)?,
        };

        let reconnect_ms: u64 = try_load("GRAMALERT_RECONNECT_MS", DEFAULT_RECONNECT_MS)?;

        Ok(Self {
            api_url,
            ws_url,
            reconnect_delay: Duration::from_millis(reconnect_ms),
            session_dir: try_load("GRAMALERT_SESSION_DIR", DEFAULT_SESSION_DIR)?,
        })
    }

    /// Defaults for everything except the API location.
    pub fn for_api(api_url: Url) -> Result<Self> {
        Ok(Self {
            ws_url: socket_url(&api_url)?,
            api_url,
            reconnect_delay: Duration::from_millis(5000),
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
        })
    }
}

/// `http://host/base` becomes `ws://host/base/ws`, `https` becomes `wss`.
pub fn socket_url(api_url: &Url) -> Result<Url> {
    let mut url = api_url.clone();

    let scheme = match api_url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };

    url.set_scheme(scheme).map_err(|_| AppError::Config {
        key: "GRAMALERT_WS_URL".to_string(),
        message: format!("cannot derive a socket url from {api_url}"),
    })?;

    let path = format!("{}/ws", api_url.path().trim_end_matches('/'));
    url.set_path(&path);

    Ok(url)
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse(key, &raw)
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");

        AppError::Config {
            key: key.to_string(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_plain() {
        let api = Url::parse("http://localhost:8080").unwrap();

        assert_eq!(socket_url(&api).unwrap().as_str(), "ws://localhost:8080/ws");
    }

    #[test]
    fn test_socket_url_tls_with_base_path() {
        let api = Url::parse("https://gram.example.org/api/").unwrap();

        assert_eq!(
            socket_url(&api).unwrap().as_str(),
            "wss://gram.example.org/api/ws"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result: Result<u64> = parse("GRAMALERT_RECONNECT_MS", "soon");

        assert!(matches!(result, Err(AppError::Config { key, .. }) if key == "GRAMALERT_RECONNECT_MS"));
    }
}
