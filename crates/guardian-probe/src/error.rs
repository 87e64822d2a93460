//! Probe error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid probe settings: {0}")]
    InvalidSettings(String),
}

pub type ProbeResult<T> = Result<T, ProbeError>;
