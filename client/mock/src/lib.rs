//! Stand-in for the GramAlert Plus API and its STOMP broker.
//!
//! Runs the same contracts the dashboard client consumes, all in memory,
//! for integration tests and for local development without the real backend.
//!
//!
//!
//! # Seeded Accounts
//! - `admin` / `password`, role `ADMIN`, id 1, cannot be deleted
//! - `villager` / `password`, role `VILLAGER`
//!
//! Accounts created from user management also get `password`.
//!
//!
//!
//! # Escalation
//!
//! Every grievance gets a deadline when it is submitted:
//!
//! | Category | Days |
//! |---|---|
//! | water, electricity | 2 |
//! | health | 3 |
//! | roads, sanitation | 7 |
//! | anything else | 10 |
//!
//! The sweep marks unresolved grievances past their deadline as overdue, raises
//! them to `High` and escalation level 1, and publishes them. The binary runs it
//! every `ESCALATION_SWEEP_SECS` (default 3600).
//!
//!
//!
//! # Test Hooks
//!
//! [`MockServer`] binds `127.0.0.1:0` and exposes failure injection, session
//! drops and subscriber waits so tests never sleep on timing.
//!
//!
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=info RUST_PORT=8080 cargo run -p mock
//! ```
use std::{
    io,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDateTime;
use tokio::{
    net::TcpListener,
    signal::{self, ctrl_c},
    sync::oneshot,
    task::JoinHandle,
    time::interval,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub mod broker;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use config::Config;
use routes::*;
use state::{now, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/register", post(register_handler))
        .route("/grievances", get(grievances_handler).post(submit_handler))
        .route("/grievances/my-requests", get(my_requests_handler))
        .route("/grievances/:id", put(edit_handler).patch(status_handler))
        .route("/alerts", get(alerts_handler).post(create_alert_handler))
        .route(
            "/alerts/:id",
            put(update_alert_handler).delete(delete_alert_handler),
        )
        .route("/api/users", get(users_handler).post(create_user_handler))
        .route("/api/users/:id", axum::routing::delete(delete_user_handler))
        .route(
            "/api/profile/me",
            get(profile_handler).put(update_profile_handler),
        )
        .route(
            "/api/profile/me/verify-password",
            post(verify_password_handler),
        )
        .route("/ws", get(broker::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), inject_failures))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new();

    tokio::spawn(sweep(state.clone(), config.sweep_interval));

    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Mock API running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Mock API shutting down...");

    Ok(())
}

async fn sweep(state: Arc<AppState>, every: Duration) {
    let mut ticks = interval(every);

    loop {
        ticks.tick().await;

        info!("Checking for overdue grievances...");
        let escalated = state.escalate(now());
        info!("Escalated {escalated} grievances");
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// In-process server on an ephemeral port, stopped on drop.
pub struct MockServer {
    address: SocketAddr,
    state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> io::Result<Self> {
        let state = AppState::new();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let (shutdown, stopped) = oneshot::channel::<()>();

        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = stopped.await;
            });
            if let Err(e) = server.await {
                warn!("Mock server stopped: {e}");
            }
        });

        Ok(Self {
            address,
            state,
            shutdown: Some(shutdown),
            _task: task,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.address)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Every request to `path` answers 500 until [`MockServer::recover`].
    pub fn fail(&self, path: &str) {
        self.state.fail(path);
    }

    pub fn recover(&self, path: &str) {
        self.state.recover(path);
    }

    pub fn drop_connections(&self) {
        self.state.broker.drop_connections();
    }

    pub async fn wait_for_subscribers(&self, topic: &str, count: usize) {
        self.state.broker.wait_for_subscribers(topic, count).await;
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state.broker.subscriber_count(topic)
    }

    pub fn session_count(&self) -> usize {
        self.state.broker.session_count()
    }

    pub fn connect_tokens(&self) -> Vec<Option<String>> {
        self.state.broker.connect_tokens()
    }

    pub fn publish_raw(&self, topic: &str, body: &str) -> usize {
        self.state.broker.publish(topic, body)
    }

    pub fn escalate_overdue(&self, at: NaiveDateTime) -> usize {
        self.state.escalate(at)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
