use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Rejected(String),

    #[error("Bad credentials")]
    BadCredentials,

    #[error("Incorrect password.")]
    IncorrectPassword,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Injected failure")]
    Injected,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload { .. } | AppError::Multipart { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Rejected { .. } => StatusCode::BAD_REQUEST,
            AppError::BadCredentials
            | AppError::IncorrectPassword
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Injected => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
