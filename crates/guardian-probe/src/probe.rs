//! Latency probe and median measurement.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

use guardian_core::{Endpoint, Latency, Measurement, ProbeOutcome};
use guardian_telemetry::Metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use crate::error::{ProbeError, ProbeResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Sampling parameters for [`measure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Samples per endpoint.
    #[serde(default = "default_samples")]
    pub samples: usize,
    /// Per-attempt connect timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between consecutive samples in milliseconds.
    #[serde(default = "default_inter_sample_delay_ms")]
    pub inter_sample_delay_ms: u64,
}

fn default_samples() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    100
}

fn default_inter_sample_delay_ms() -> u64 {
    50
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            timeout_ms: default_timeout_ms(),
            inter_sample_delay_ms: default_inter_sample_delay_ms(),
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn inter_sample_delay(&self) -> Duration {
        Duration::from_millis(self.inter_sample_delay_ms)
    }

    pub fn validate(&self) -> ProbeResult<()> {
        if self.samples == 0 {
            return Err(ProbeError::InvalidSettings(
                "samples must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ProbeError::InvalidSettings(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Single-sample latency probe.
pub trait Prober: Send + Sync {
    /// Attempt one connection. Never fails: errors and timeouts map to
    /// `ProbeOutcome::Unreachable`.
    fn sample<'a>(&'a self, address: &'a str, port: u16, timeout: Duration)
        -> BoxFuture<'a, ProbeOutcome>;
}

/// Production prober: plain TCP connect under a timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

impl TcpProber {
    pub fn new() -> Self {
        Self
    }
}

impl Prober for TcpProber {
    fn sample<'a>(
        &'a self,
        address: &'a str,
        port: u16,
        connect_timeout: Duration,
    ) -> BoxFuture<'a, ProbeOutcome> {
        Box::pin(async move {
            let start = Instant::now();
            match timeout(connect_timeout, TcpStream::connect((address, port))).await {
                Ok(Ok(_stream)) => ProbeOutcome::Reachable(start.elapsed()),
                Ok(Err(e)) => {
                    trace!(address, port, error = %e, "TCP connect failed");
                    ProbeOutcome::Unreachable
                }
                Err(_) => {
                    trace!(address, port, "TCP connect timeout");
                    ProbeOutcome::Unreachable
                }
            }
        })
    }
}

/// Median of the reachable samples.
///
/// Even counts average the two middle values. No reachable samples yields
/// `Latency::Infinite`.
pub fn median_latency(samples: &[ProbeOutcome]) -> Latency {
    let mut reachable: Vec<Duration> = samples.iter().filter_map(|s| s.elapsed()).collect();
    if reachable.is_empty() {
        return Latency::Infinite;
    }
    reachable.sort_unstable();
    let mid = reachable.len() / 2;
    if reachable.len() % 2 == 1 {
        Latency::Finite(reachable[mid])
    } else {
        Latency::Finite((reachable[mid - 1] + reachable[mid]) / 2)
    }
}

/// Take `settings.samples` sequential samples of `endpoint` and summarise
/// them with [`median_latency`].
pub async fn measure(
    prober: &dyn Prober,
    endpoint: &Endpoint,
    settings: &ProbeSettings,
) -> Measurement {
    let role = endpoint.role.as_str();
    let mut samples = Vec::with_capacity(settings.samples);

    for i in 0..settings.samples {
        if i > 0 && settings.inter_sample_delay_ms > 0 {
            tokio::time::sleep(settings.inter_sample_delay()).await;
        }
        let outcome = prober
            .sample(&endpoint.address, endpoint.port, settings.timeout())
            .await;
        Metrics::probe_sample(
            role,
            outcome.elapsed().map(|d| d.as_secs_f64() * 1000.0),
        );
        samples.push(outcome);
    }

    let summary = median_latency(&samples);
    let reachable = samples.iter().filter(|s| s.is_reachable()).count();
    debug!(
        role,
        server = %endpoint.label,
        address = %endpoint.address,
        port = endpoint.port,
        reachable,
        total = samples.len(),
        latency = %summary,
        "Endpoint measured"
    );

    Measurement::new(endpoint.clone(), samples, summary)
}

/// Scripted prober for testing.
///
/// Outcomes are queued per address; once a queue is empty the address's
/// fallback (or the global fallback) repeats.
#[derive(Debug)]
pub struct MockProber {
    scripts: Mutex<HashMap<String, VecDeque<ProbeOutcome>>>,
    fixed: Mutex<HashMap<String, ProbeOutcome>>,
    fallback: ProbeOutcome,
    calls: Mutex<Vec<(String, u16)>>,
}

impl Default for MockProber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProber {
    /// Every address is unreachable unless configured.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fixed: Mutex::new(HashMap::new()),
            fallback: ProbeOutcome::Unreachable,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer `outcome` for `address`.
    pub fn with_fixed(self, address: &str, outcome: ProbeOutcome) -> Self {
        self.set_fixed(address, outcome);
        self
    }

    /// Always answer a reachable sample of `millis` for `address`.
    pub fn with_latency_ms(self, address: &str, millis: u64) -> Self {
        self.with_fixed(address, ProbeOutcome::Reachable(Duration::from_millis(millis)))
    }

    pub fn set_fixed(&self, address: &str, outcome: ProbeOutcome) {
        self.fixed.lock().insert(address.to_string(), outcome);
    }

    /// Queue outcomes for `address`, answered in order before the fixed value.
    pub fn push_script(&self, address: &str, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.scripts
            .lock()
            .entry(address.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, address: &str) -> usize {
        self.calls.lock().iter().filter(|(a, _)| a == address).count()
    }
}

impl Prober for MockProber {
    fn sample<'a>(
        &'a self,
        address: &'a str,
        port: u16,
        _timeout: Duration,
    ) -> BoxFuture<'a, ProbeOutcome> {
        self.calls.lock().push((address.to_string(), port));
        let scripted = self
            .scripts
            .lock()
            .get_mut(address)
            .and_then(|queue| queue.pop_front());
        let outcome = scripted
            .or_else(|| self.fixed.lock().get(address).copied())
            .unwrap_or(self.fallback);
        Box::pin(async move { outcome })
    }
}
