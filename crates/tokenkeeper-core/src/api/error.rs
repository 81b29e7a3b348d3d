use thiserror::Error;

use crate::auth::error::truncate_body;
use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    Auth(#[from] AuthError),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token rejected by server")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the caller should send the user to a login flow.
    pub fn requires_login(&self) -> bool {
        match self {
            ApiError::Auth(e) => e.requires_login(),
            ApiError::Unauthorized => true,
            _ => false,
        }
    }
}
