//! Prometheus metrics and structured logging for the terminal guardian.
//!
//! - Prometheus metrics for probing, selection, alerts and process lifecycle
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
