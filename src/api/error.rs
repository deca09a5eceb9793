//! Error types shared by the REST client.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`ApiError`] failures.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures that can occur while talking to the platform REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend returned an unexpected status code.
    #[error("unexpected response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be parsed into the expected shape.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// Credentials are missing or expired (HTTP 401).
    #[error("authentication required")]
    AuthRequired,
    /// The signed-in account may not perform this operation (HTTP 403).
    #[error("access denied")]
    AccessDenied,
}
