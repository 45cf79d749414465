//! Client side of GramAlert Plus: keeps role dashboards in sync with the API and its live feeds.
//!
//!
//!
//! # Moving Parts
//! - [`session::Session`] holds who is signed in, hydrated once from disk and shared by handle
//! - [`api::ApiClient`] makes the REST calls, bearer token read from the session per request
//! - [`realtime::RealtimeClient`] keeps one broker socket alive and fans frames out to typed streams
//! - [`merge`] folds single records into newest-first collections
//! - [`controller::DashboardController`] ties them together for one view
//!
//!
//!
//! # Data Flow
//!
//! **In**: initial fetches and realtime events both end up in the merge functions.
//! **Out**: every state change is pushed to the dashboard's observers as a [`controller::Notification`].
//!
//! Writes go out over HTTP. A successful write only produces a toast; the record
//! itself comes back over the realtime feed, the same way every other client sees it.
//!
//!
//!
//! # Realtime Topics
//!
//! | Topic | Payload |
//! |---|---|
//! | `/topic/grievances` | grievance JSON |
//! | `/topic/alerts` | alert JSON |
//! | `/topic/alerts/deleted` | bare alert id |
//!
//!
//!
//! # Configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `GRAMALERT_API_URL` | `http://localhost:8080` |
//! | `GRAMALERT_WS_URL` | API url with `ws`/`wss` scheme and `/ws` appended |
//! | `GRAMALERT_RECONNECT_MS` | `5000` |
//! | `GRAMALERT_SESSION_DIR` | `.gramalert` |
//!
//!
//!
//! # Notes
//!
//! ## Missed Events
//! Nothing refetches on a timer. If the socket was down while something changed,
//! the dashboard catches up on the next manual refresh.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod merge;
pub mod realtime;
pub mod session;
