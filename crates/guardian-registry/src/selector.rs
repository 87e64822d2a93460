//! Lowest-latency server per role.

use std::sync::Arc;

use guardian_core::{Endpoint, Measurement, SelectionResult, ServerRole};
use guardian_probe::{measure, ProbeSettings, Prober};
use guardian_telemetry::Metrics;
use tracing::{info, warn};

/// Measures every candidate and picks the minimum median latency per role.
pub struct ServerSelector {
    prober: Arc<dyn Prober>,
    settings: ProbeSettings,
}

impl ServerSelector {
    pub fn new(prober: Arc<dyn Prober>, settings: ProbeSettings) -> Self {
        Self { prober, settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Measure every endpoint sequentially, in catalog order.
    pub async fn measure_all(&self, endpoints: &[Endpoint]) -> Vec<Measurement> {
        let mut measurements = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            measurements.push(measure(self.prober.as_ref(), endpoint, &self.settings).await);
        }
        measurements
    }

    /// Pick the best endpoint per role.
    ///
    /// A role with candidates always resolves, even when every candidate is
    /// unreachable. Ties go to the first candidate in catalog order. A role
    /// without candidates stays `None`.
    pub async fn select(&self, endpoints: &[Endpoint]) -> SelectionResult {
        let measurements = self.measure_all(endpoints).await;
        let mut result = SelectionResult::default();

        for role in ServerRole::ALL {
            let winner = pick_best(measurements.iter().filter(|m| m.endpoint.role == role));
            match &winner {
                Some(best) => {
                    if !best.summary.is_finite() {
                        warn!(
                            role = %role,
                            server = %best.endpoint.label,
                            "Every candidate unreachable, keeping first candidate"
                        );
                    }
                    info!(
                        role = %role,
                        server = %best.endpoint.label,
                        address = %best.endpoint.address,
                        port = best.endpoint.port,
                        latency = %best.summary,
                        "Selected server"
                    );
                    Metrics::selected_latency(role.as_str(), best.summary.as_millis_f64());
                }
                None => {
                    warn!(role = %role, "No candidate servers, selection left unchanged");
                }
            }
            result.set_role(role, winner.cloned());
        }

        result
    }
}

/// One-pass minimum with strict `<`: the first candidate wins ties.
fn pick_best<'a>(candidates: impl Iterator<Item = &'a Measurement>) -> Option<&'a Measurement> {
    let mut best: Option<&Measurement> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.summary < current.summary => best = Some(candidate),
            None => best = Some(candidate),
            _ => {}
        }
    }
    best
}
