use models::Role;
use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid {key}: {message}")]
    Config { key: String, message: String },

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Not permitted for role {0}")]
    Forbidden(Role),
}

impl AppError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AppError::Status { status, .. } => Some(*status),
            AppError::Http(e) => e.status(),
            _ => None,
        }
    }
}
