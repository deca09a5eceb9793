//! Library crate for pollwave-student, exposing modules for binaries and integration tests.

pub mod api;
pub mod channel;
pub mod config;
pub mod dto;
mod error;
pub mod session;
pub mod store;

pub use error::SessionError;
