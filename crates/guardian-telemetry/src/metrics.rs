//! Prometheus metrics for the terminal guardian.
//!
//! Covers:
//! - Probe latency per role and the latency of the selected servers
//! - Terminal liveness
//! - Alert delivery and debounce suppression
//! - Terminate / restart outcomes
//! - Monitor tick failures
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a startup bug. Panics only occur during static
//! initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};

/// Probe latency in milliseconds (reachable samples only).
pub static PROBE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "guardian_probe_latency_ms",
        "TCP connect latency of reachable probe samples in milliseconds",
        &["role"],
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0]
    )
    .unwrap()
});

/// Unreachable probe samples.
pub static PROBE_UNREACHABLE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guardian_probe_unreachable_total",
        "Probe samples that failed to connect",
        &["role"]
    )
    .unwrap()
});

/// Summary latency of the currently selected server (-1 = unreachable).
pub static SELECTED_LATENCY_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "guardian_selected_latency_ms",
        "Median latency of the selected server in milliseconds (-1=unreachable)",
        &["role"]
    )
    .unwrap()
});

/// Terminal liveness (1 = running).
pub static TERMINAL_RUNNING: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "guardian_terminal_running",
        "Terminal process liveness (1=running)"
    )
    .unwrap()
});

/// Alerts handed to the notification sink.
pub static ALERTS_SENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guardian_alerts_sent_total",
        "Alerts delivered to the notification sink",
        &["key", "delivered"]
    )
    .unwrap()
});

/// Alerts dropped before reaching the sink.
pub static ALERTS_SUPPRESSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guardian_alerts_suppressed_total",
        "Alerts suppressed by the gate",
        &["key", "reason"]
    )
    .unwrap()
});

/// Per-process terminate outcomes.
pub static TERMINATE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guardian_terminate_total",
        "Process terminate outcomes",
        &["process", "outcome"]
    )
    .unwrap()
});

/// Restart attempts by target and result.
pub static RESTART_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guardian_restart_total",
        "Restart attempts",
        &["target", "result"]
    )
    .unwrap()
});

/// Monitor tick failures.
pub static MONITOR_TICK_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "guardian_monitor_tick_errors_total",
        "Errors caught at the monitor tick boundary",
        &["stage"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record one probe sample. `None` means unreachable.
    pub fn probe_sample(role: &str, latency_ms: Option<f64>) {
        match latency_ms {
            Some(ms) => PROBE_LATENCY_MS.with_label_values(&[role]).observe(ms),
            None => PROBE_UNREACHABLE_TOTAL.with_label_values(&[role]).inc(),
        }
    }

    /// Record the summary latency of the selected server.
    pub fn selected_latency(role: &str, latency_ms: f64) {
        let value = if latency_ms.is_finite() { latency_ms } else { -1.0 };
        SELECTED_LATENCY_MS.with_label_values(&[role]).set(value);
    }

    pub fn terminal_running(running: bool) {
        TERMINAL_RUNNING.set(if running { 1.0 } else { 0.0 });
    }

    /// Record an alert handed to the sink.
    pub fn alert_sent(key: &str, delivered: bool) {
        let delivered = if delivered { "true" } else { "false" };
        ALERTS_SENT_TOTAL
            .with_label_values(&[key, delivered])
            .inc();
    }

    /// Record an alert suppressed by the gate.
    pub fn alert_suppressed(key: &str, reason: &str) {
        ALERTS_SUPPRESSED_TOTAL
            .with_label_values(&[key, reason])
            .inc();
    }

    pub fn terminate_outcome(process: &str, outcome: &str) {
        TERMINATE_TOTAL
            .with_label_values(&[process, outcome])
            .inc();
    }

    pub fn restart(target: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        RESTART_TOTAL.with_label_values(&[target, result]).inc();
    }

    pub fn monitor_tick_error(stage: &str) {
        MONITOR_TICK_ERRORS_TOTAL.with_label_values(&[stage]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
