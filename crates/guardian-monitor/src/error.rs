//! Monitor error types.

use guardian_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Server document error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid monitor settings: {0}")]
    InvalidSettings(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
