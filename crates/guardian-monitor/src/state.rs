//! Monitor state and read-only snapshots.

use chrono::{DateTime, Utc};
use guardian_core::Latency;
use serde::Serialize;

/// Mutable state owned by the monitor loop. Nothing else writes it.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    /// `None` until the first tick.
    pub last_running: Option<bool>,
    pub last_connected: Option<bool>,
    pub ticks: u64,
    pub tick_errors: u64,
}

/// Copy of the monitor's view, published after every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub terminal_running: Option<bool>,
    pub terminal_processes: usize,
    pub connected: Option<bool>,
    pub market_data_latency: Option<Latency>,
    pub order_routing_latency: Option<Latency>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub tick_errors: u64,
}
