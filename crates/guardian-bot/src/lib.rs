//! Trading terminal guardian.
//!
//! Keeps a trading terminal running and connected to its fastest servers:
//! - Latency-based server selection and document rewrite on restart
//! - Process supervision for the terminal and its companion client
//! - Periodic health monitoring with debounced alerts
//! - Daily scheduled restarts and shutdowns

pub mod app;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod tasks;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use orchestrator::{ClientReport, HealthSummary, Orchestrator, RestartReport};
pub use scheduler::{DailyScheduler, JobKind};
pub use tasks::{LoopSlot, Submission, TaskRunner};
