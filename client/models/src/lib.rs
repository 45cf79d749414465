//! # Models
//!
//! Records exchanged with the GramAlert Plus API, shared by the dashboard
//! library and the mock API.
//!
//! ## Wire format
//!
//! - JSON, camelCase field names
//! - Timestamps are local date-times without an offset, e.g. `2025-03-01T09:30:00.123456`
//! - Grievance status strings keep their spaces: `"In Progress"`
//! - Roles are upper case: `"ADMIN"`, `"VILLAGER"`
//!
//! Realtime messages travel as STOMP frames, see [`stomp`].
//!
//! ## Ordering
//!
//! Every record shown in a list implements [`Entity`] so collections can be
//! kept newest first without knowing the concrete type.
use chrono::NaiveDateTime;

pub mod alert;
pub mod grievance;
pub mod stomp;
pub mod user;

/// Broker destinations, one record type each.
pub mod topics {
    /// Full grievance JSON on every create, edit, status change and escalation.
    pub const GRIEVANCES: &str = "/topic/grievances";
    /// Full alert JSON on create and edit.
    pub const ALERTS: &str = "/topic/alerts";
    /// Bare id of a deleted alert.
    pub const ALERTS_DELETED: &str = "/topic/alerts/deleted";
}

pub use alert::{Alert, AlertDraft};
pub use grievance::{
    EscalationLevel, Grievance, GrievanceEdit, Location, ParseStatusError, Priority, Status,
    StatusChange,
};
pub use user::{
    Credentials, Identity, LoginResponse, NewUser, ParseRoleError, PasswordCheck, Profile,
    ProfileUpdate, Registration, Role, User,
};

/// A record with a server-assigned identifier and a creation time.
pub trait Entity {
    fn id(&self) -> i64;

    fn created_at(&self) -> Option<NaiveDateTime>;
}
