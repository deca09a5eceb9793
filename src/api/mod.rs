/// REST client for the platform backend.
pub mod backend;
/// Error types shared by the REST client.
pub mod error;

pub use backend::{ConnectionReport, HttpBackend, StudentBackend};
pub use error::{ApiError, ApiResult};
