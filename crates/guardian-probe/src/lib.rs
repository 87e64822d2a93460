//! TCP connect latency probing.
//!
//! A sample is the wall-clock time to establish a TCP connection. Failures
//! and timeouts are values (`ProbeOutcome::Unreachable`), never errors.

pub mod error;
pub mod probe;

pub use error::{ProbeError, ProbeResult};
pub use probe::{
    measure, median_latency, BoxFuture, MockProber, ProbeSettings, Prober, TcpProber,
};
