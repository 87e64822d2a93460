//! Monitor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Latency above this raises an alert.
    #[serde(default = "default_high_latency_ms")]
    pub high_latency_ms: u64,
    /// Connect timeout of the single per-tick probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    10
}

fn default_high_latency_ms() -> u64 {
    200
}

fn default_probe_timeout_ms() -> u64 {
    100
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            high_latency_ms: default_high_latency_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn high_latency(&self) -> Duration {
        Duration::from_millis(self.high_latency_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.interval_secs == 0 {
            return Err(MonitorError::InvalidSettings(
                "interval_secs must be positive".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(MonitorError::InvalidSettings(
                "probe_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
