use reqwest::StatusCode;
use thiserror::Error;

use crate::api::ApiError;

/// Errors that end a student session before or while it runs.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session code is empty or contains characters a join code never has.
    #[error("invalid session code: {0:?}")]
    InvalidSessionCode(String),
    /// Credentials are missing or expired; the caller must sign in again.
    #[error("authentication required")]
    AuthRequired,
    /// The signed-in account is not allowed to join this session.
    #[error("access denied")]
    AccessDenied,
    /// The session does not exist or has already ended.
    #[error("session not found")]
    NotFound,
    /// A required backend call failed.
    #[error("backend request failed")]
    Backend(#[source] ApiError),
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::AuthRequired => SessionError::AuthRequired,
            ApiError::AccessDenied => SessionError::AccessDenied,
            ApiError::RequestStatus { status, .. } if status == StatusCode::NOT_FOUND => {
                SessionError::NotFound
            }
            other => SessionError::Backend(other),
        }
    }
}
