//! Alert gating: enabled flag, daily window, per-key debounce.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use guardian_core::{DailyWindow, ServerRole};
use guardian_telemetry::Metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::sink::{NotificationSink, Severity};

/// Debounce key. Alerts with different keys never suppress each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey(String);

impl AlertKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Terminal running/stopped transitions.
    pub fn terminal_status() -> Self {
        Self::new("terminal:status")
    }

    /// High latency on one role's selected server.
    pub fn latency(role: ServerRole) -> Self {
        Self(format!("latency:{}", role))
    }

    pub fn restart(target: &str) -> Self {
        Self(format!("restart:{}", target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum seconds between two deliveries of the same key.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Daily window start, `HH:MM:SS`.
    #[serde(default = "default_window_start")]
    pub window_start: String,
    /// Daily window end, `HH:MM:SS`.
    #[serde(default = "default_window_end")]
    pub window_end: String,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    300
}

fn default_window_start() -> String {
    "09:00:00".to_string()
}

fn default_window_end() -> String {
    "15:30:00".to_string()
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            window_start: default_window_start(),
            window_end: default_window_end(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Deliver,
    Disabled,
    OutsideWindow,
    Debounced,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deliver => "deliver",
            Self::Disabled => "disabled",
            Self::OutsideWindow => "outside_window",
            Self::Debounced => "debounced",
        }
    }
}

/// Decides whether an alert is delivered. The last-sent table is shared by
/// every caller.
pub struct AlertGate {
    enabled: bool,
    interval: Duration,
    /// `None` when the window does not parse; every time is then allowed.
    window: Option<DailyWindow>,
    last_sent: Mutex<HashMap<AlertKey, Instant>>,
}

impl AlertGate {
    pub fn new(settings: &GateSettings) -> Self {
        let window = match DailyWindow::parse(&settings.window_start, &settings.window_end) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!(error = %e, "Invalid notification window, notifying at any time");
                None
            }
        };
        Self {
            enabled: settings.enabled,
            interval: Duration::from_secs(settings.interval_secs),
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Check against the current time.
    pub fn check(&self, key: &AlertKey, bypass_debounce: bool) -> GateDecision {
        self.check_at(key, bypass_debounce, Instant::now(), Local::now().time())
    }

    /// Check at an explicit monotonic instant and local wall-clock time.
    ///
    /// A `Deliver` decision records `now` as the key's last-sent time,
    /// including when the debounce is bypassed.
    pub fn check_at(
        &self,
        key: &AlertKey,
        bypass_debounce: bool,
        now: Instant,
        local_time: NaiveTime,
    ) -> GateDecision {
        if !self.enabled {
            return GateDecision::Disabled;
        }
        if let Some(window) = &self.window {
            if !window.contains(local_time) {
                return GateDecision::OutsideWindow;
            }
        }

        let mut last_sent = self.last_sent.lock();
        if !bypass_debounce {
            if let Some(last) = last_sent.get(key) {
                if now.saturating_duration_since(*last) < self.interval {
                    return GateDecision::Debounced;
                }
            }
        }
        last_sent.insert(key.clone(), now);
        GateDecision::Deliver
    }
}

/// One alert for [`Notifier::alert`].
#[derive(Debug, Clone)]
pub struct Alert {
    pub key: AlertKey,
    pub title: String,
    pub body: String,
    pub severity: Severity,
    /// State transitions skip the debounce; the other gates still apply.
    pub bypass_debounce: bool,
}

impl Alert {
    pub fn new(key: AlertKey, title: impl Into<String>, body: impl Into<String>, severity: Severity) -> Self {
        Self {
            key,
            title: title.into(),
            body: body.into(),
            severity,
            bypass_debounce: false,
        }
    }

    pub fn transition(mut self) -> Self {
        self.bypass_debounce = true;
        self
    }
}

/// Gate in front of a sink.
#[derive(Clone)]
pub struct Notifier {
    gate: Arc<AlertGate>,
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(gate: Arc<AlertGate>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { gate, sink }
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    /// Gate and deliver. Returns the gate's decision; delivery failures are
    /// logged by the sink.
    pub async fn alert(&self, alert: Alert) -> GateDecision {
        let decision = self.gate.check(&alert.key, alert.bypass_debounce);
        self.dispatch(alert, decision).await
    }

    /// Like [`Notifier::alert`] with an explicit clock.
    pub async fn alert_at(&self, alert: Alert, now: Instant, local_time: NaiveTime) -> GateDecision {
        let decision = self
            .gate
            .check_at(&alert.key, alert.bypass_debounce, now, local_time);
        self.dispatch(alert, decision).await
    }

    async fn dispatch(&self, alert: Alert, decision: GateDecision) -> GateDecision {
        if decision != GateDecision::Deliver {
            debug!(key = %alert.key, reason = decision.as_str(), "Alert suppressed");
            Metrics::alert_suppressed(alert.key.as_str(), decision.as_str());
            return decision;
        }
        let delivered = self
            .sink
            .send(&alert.title, &alert.body, alert.severity)
            .await;
        Metrics::alert_sent(alert.key.as_str(), delivered);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    fn gate() -> AlertGate {
        AlertGate::new(&GateSettings::default())
    }

    #[test]
    fn test_debounce_law() {
        let gate = gate();
        let key = AlertKey::latency(ServerRole::MarketData);
        let t0 = Instant::now();

        assert_eq!(gate.check_at(&key, false, t0, noon()), GateDecision::Deliver);
        assert_eq!(
            gate.check_at(&key, false, t0 + Duration::from_secs(299), noon()),
            GateDecision::Debounced
        );
        assert_eq!(
            gate.check_at(&key, false, t0 + Duration::from_secs(300), noon()),
            GateDecision::Deliver
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let gate = gate();
        let t0 = Instant::now();
        assert_eq!(
            gate.check_at(&AlertKey::latency(ServerRole::MarketData), false, t0, noon()),
            GateDecision::Deliver
        );
        assert_eq!(
            gate.check_at(&AlertKey::latency(ServerRole::OrderRouting), false, t0, noon()),
            GateDecision::Deliver
        );
        assert_eq!(
            gate.check_at(&AlertKey::terminal_status(), false, t0, noon()),
            GateDecision::Deliver
        );
    }

    #[test]
    fn test_transition_bypasses_debounce_only() {
        let gate = gate();
        let key = AlertKey::terminal_status();
        let t0 = Instant::now();

        assert_eq!(gate.check_at(&key, false, t0, noon()), GateDecision::Deliver);
        assert_eq!(
            gate.check_at(&key, true, t0 + Duration::from_secs(1), noon()),
            GateDecision::Deliver
        );
        let evening = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
        assert_eq!(
            gate.check_at(&key, true, t0 + Duration::from_secs(2), evening),
            GateDecision::OutsideWindow
        );
    }

    #[test]
    fn test_disabled_blocks_transitions() {
        let gate = AlertGate::new(&GateSettings {
            enabled: false,
            ..GateSettings::default()
        });
        assert_eq!(
            gate.check_at(&AlertKey::terminal_status(), true, Instant::now(), noon()),
            GateDecision::Disabled
        );
    }

    #[test]
    fn test_invalid_window_allows_any_time() {
        let gate = AlertGate::new(&GateSettings {
            window_start: "nine".to_string(),
            ..GateSettings::default()
        });
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        assert_eq!(
            gate.check_at(&AlertKey::new("x"), false, Instant::now(), midnight),
            GateDecision::Deliver
        );
    }

    #[tokio::test]
    async fn test_notifier_only_sends_delivered() {
        let sink = Arc::new(RecordingSink::new());
        let notifier = Notifier::new(Arc::new(gate()), sink.clone());
        let key = AlertKey::latency(ServerRole::OrderRouting);
        let t0 = Instant::now();

        let alert = || Alert::new(key.clone(), "High latency", "250ms", Severity::Warning);
        assert_eq!(notifier.alert_at(alert(), t0, noon()).await, GateDecision::Deliver);
        assert_eq!(
            notifier.alert_at(alert(), t0 + Duration::from_secs(10), noon()).await,
            GateDecision::Debounced
        );
        assert_eq!(sink.count(), 1);
    }
}
