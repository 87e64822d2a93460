//! Error types for guardian-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid server role: {0}")]
    InvalidRole(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid time of day: {0}")]
    InvalidTime(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
