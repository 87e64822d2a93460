//! Latency samples, summaries and per-role selection results.

use crate::endpoint::{Endpoint, ServerRole};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Result of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Reachable(Duration),
    Unreachable,
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable(_))
    }

    /// Elapsed time, if the connection was established.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::Reachable(d) => Some(*d),
            Self::Unreachable => None,
        }
    }

    pub fn as_latency(&self) -> Latency {
        match self {
            Self::Reachable(d) => Latency::Finite(*d),
            Self::Unreachable => Latency::Infinite,
        }
    }
}

/// Summary latency of an endpoint.
///
/// Totally ordered: `Infinite` compares greater than every finite value and
/// equal to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Latency {
    Finite(Duration),
    Infinite,
}

impl Latency {
    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Finite(_))
    }

    /// Milliseconds as f64; `f64::INFINITY` for `Infinite`.
    pub fn as_millis_f64(&self) -> f64 {
        match self {
            Self::Finite(d) => d.as_secs_f64() * 1000.0,
            Self::Infinite => f64::INFINITY,
        }
    }

    /// True when this latency is strictly above the threshold.
    /// `Infinite` is above every threshold.
    pub fn exceeds(&self, threshold: Duration) -> bool {
        match self {
            Self::Finite(d) => *d > threshold,
            Self::Infinite => true,
        }
    }
}

impl Ord for Latency {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Finite(a), Self::Finite(b)) => a.cmp(b),
            (Self::Finite(_), Self::Infinite) => Ordering::Less,
            (Self::Infinite, Self::Finite(_)) => Ordering::Greater,
            (Self::Infinite, Self::Infinite) => Ordering::Equal,
        }
    }
}

impl PartialOrd for Latency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(_) => write!(f, "{:.2}ms", self.as_millis_f64()),
            Self::Infinite => f.write_str("unreachable"),
        }
    }
}

/// An endpoint together with its samples and summary latency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub endpoint: Endpoint,
    pub samples: Vec<ProbeOutcome>,
    pub summary: Latency,
}

impl Measurement {
    pub fn new(endpoint: Endpoint, samples: Vec<ProbeOutcome>, summary: Latency) -> Self {
        Self {
            endpoint,
            samples,
            summary,
        }
    }

    /// Human-readable description pushed to the status sink.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.endpoint, self.summary)
    }
}

/// Winning measurement per role. `None` leaves that role's current
/// configuration untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub market_data: Option<Measurement>,
    pub order_routing: Option<Measurement>,
}

impl SelectionResult {
    pub fn for_role(&self, role: ServerRole) -> Option<&Measurement> {
        match role {
            ServerRole::MarketData => self.market_data.as_ref(),
            ServerRole::OrderRouting => self.order_routing.as_ref(),
        }
    }

    pub fn set_role(&mut self, role: ServerRole, measurement: Option<Measurement>) {
        match role {
            ServerRole::MarketData => self.market_data = measurement,
            ServerRole::OrderRouting => self.order_routing = measurement,
        }
    }

    /// True when neither role resolved.
    pub fn is_empty(&self) -> bool {
        self.market_data.is_none() && self.order_routing.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.market_data.is_some() && self.order_routing.is_some()
    }
}
