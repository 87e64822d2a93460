//! Health monitoring loop.
//!
//! Every tick re-resolves terminal liveness, re-reads the selected servers
//! from the server document, probes them once and raises gated alerts.

pub mod config;
pub mod error;
pub mod monitor;
pub mod state;
pub mod status;

pub use config::MonitorSettings;
pub use error::{MonitorError, MonitorResult};
pub use monitor::{HealthMonitor, TickReport};
pub use state::{MonitorSnapshot, MonitorState};
pub use status::{LogStatusSink, RecordingStatusSink, StatusSink};
