//! Core domain types for the trading terminal guardian.
//!
//! This crate provides the types shared by every other crate:
//! - `Endpoint`, `ServerRole`: upstream server candidates from the server document
//! - `ProbeOutcome`, `Latency`, `Measurement`: latency samples and summaries
//! - `SelectionResult`: the winning server per role
//! - `ProcessRecord`, `ProcessState`: transient view of an OS process
//! - `DailyWindow`: `HH:MM:SS` daily times and windows

pub mod endpoint;
pub mod error;
pub mod latency;
pub mod process;
pub mod time;

pub use endpoint::{Endpoint, ServerRole, PREMIUM_MARKER};
pub use error::{CoreError, Result};
pub use latency::{Latency, Measurement, ProbeOutcome, SelectionResult};
pub use process::{ProcessRecord, ProcessState};
pub use time::{parse_time_of_day, DailyWindow};
