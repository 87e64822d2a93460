//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] guardian_core::CoreError),

    #[error("Probe error: {0}")]
    Probe(#[from] guardian_probe::ProbeError),

    #[error("Registry error: {0}")]
    Registry(#[from] guardian_registry::RegistryError),

    #[error("Process error: {0}")]
    Process(#[from] guardian_process::ProcessError),

    #[error("Notify error: {0}")]
    Notify(#[from] guardian_notify::NotifyError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] guardian_monitor::MonitorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] guardian_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Action already running: {0}")]
    AlreadyRunning(String),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
