//! Terminate, start and inspect managed processes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use guardian_core::{ProcessRecord, ProcessState};
use guardian_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ProcessError, ProcessResult};
use crate::health::HealthReport;
use crate::identity::ProcessIdentity;
use crate::table::{ProcessTable, SignalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Wait after the graceful signal before killing.
    #[serde(default = "default_graceful_timeout_secs")]
    pub graceful_timeout_secs: u64,
    /// Wait after the kill before giving up.
    #[serde(default = "default_force_timeout_secs")]
    pub force_timeout_secs: u64,
    /// How long `start` waits for the process to appear.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    /// Poll interval while waiting for a process to exit.
    #[serde(default = "default_exit_poll_interval_ms")]
    pub exit_poll_interval_ms: u64,
    /// Poll interval while waiting for a process to start.
    #[serde(default = "default_start_poll_interval_ms")]
    pub start_poll_interval_ms: u64,
    /// Resident memory above this is reported as advisory.
    #[serde(default = "default_memory_warning_mb")]
    pub memory_warning_mb: f64,
}

fn default_graceful_timeout_secs() -> u64 {
    10
}

fn default_force_timeout_secs() -> u64 {
    5
}

fn default_start_timeout_secs() -> u64 {
    30
}

fn default_exit_poll_interval_ms() -> u64 {
    200
}

fn default_start_poll_interval_ms() -> u64 {
    1000
}

fn default_memory_warning_mb() -> f64 {
    1000.0
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            graceful_timeout_secs: default_graceful_timeout_secs(),
            force_timeout_secs: default_force_timeout_secs(),
            start_timeout_secs: default_start_timeout_secs(),
            exit_poll_interval_ms: default_exit_poll_interval_ms(),
            start_poll_interval_ms: default_start_poll_interval_ms(),
            memory_warning_mb: default_memory_warning_mb(),
        }
    }
}

/// Per-pid lifecycle while terminating.
///
/// ```text
/// Unknown → Running → GracefulShutdownRequested → Exited
///                                               → ForcedKillRequested → Exited
///                                                                     → TerminateFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Unknown,
    Running,
    GracefulShutdownRequested,
    ForcedKillRequested,
    Exited,
    TerminateFailed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::GracefulShutdownRequested => "graceful_requested",
            Self::ForcedKillRequested => "kill_requested",
            Self::Exited => "exited",
            Self::TerminateFailed => "terminate_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateOutcome {
    pub pid: u32,
    pub state: LifecycleState,
    /// Whether the forced kill was needed.
    pub forced: bool,
    pub reason: Option<String>,
}

impl TerminateOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == LifecycleState::Exited
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateReport {
    pub name: String,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<TerminateOutcome>,
}

impl TerminateReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// `TerminateFailed` when any process survived.
    pub fn ensure_success(&self) -> ProcessResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ProcessError::TerminateFailed {
                name: self.name.clone(),
                failed: self.failed,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatusReport {
    pub name: String,
    pub running: bool,
    pub processes: Vec<ProcessRecord>,
}

impl ProcessStatusReport {
    pub fn count(&self) -> usize {
        self.processes.len()
    }
}

/// Process supervisor over a [`ProcessTable`].
pub struct ProcessSupervisor {
    table: Arc<dyn ProcessTable>,
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(table: Arc<dyn ProcessTable>, settings: SupervisorSettings) -> Self {
        Self { table, settings }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Processes currently matching `identity`.
    pub fn find(&self, identity: &ProcessIdentity) -> Vec<ProcessRecord> {
        self.table
            .list(&identity.name)
            .into_iter()
            .filter(|r| identity.matches(r))
            .collect()
    }

    pub fn status(&self, identity: &ProcessIdentity) -> ProcessStatusReport {
        let processes: Vec<ProcessRecord> = self
            .find(identity)
            .into_iter()
            .filter(|r| r.status == ProcessState::Running)
            .collect();
        ProcessStatusReport {
            name: identity.name.clone(),
            running: !processes.is_empty(),
            processes,
        }
    }

    pub fn is_running(&self, identity: &ProcessIdentity) -> bool {
        self.status(identity).running
    }

    pub fn health_report(&self, identity: &ProcessIdentity) -> HealthReport {
        HealthReport::evaluate(
            &identity.name,
            self.find(identity),
            self.settings.memory_warning_mb,
        )
    }

    /// Terminate every process matching `identity`, gracefully first.
    ///
    /// No matches yields an empty report (0 succeeded, 0 failed).
    pub async fn terminate_by_name(&self, identity: &ProcessIdentity) -> TerminateReport {
        let targets = self.find(identity);
        let mut report = TerminateReport {
            name: identity.name.clone(),
            ..TerminateReport::default()
        };

        if targets.is_empty() {
            info!(process = %identity.name, "No running process to terminate");
            return report;
        }

        for target in &targets {
            info!(
                process = %identity.name,
                pid = target.pid,
                status = ?target.status,
                "Terminating process"
            );
            let outcome = self.terminate_pid(target.pid).await;
            Metrics::terminate_outcome(&identity.name, outcome.state.as_str());
            if outcome.succeeded() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            report.outcomes.push(outcome);
        }

        self.log_zombies(identity);
        info!(
            process = %identity.name,
            succeeded = report.succeeded,
            failed = report.failed,
            "Terminate finished"
        );
        report
    }

    /// Graceful signal, bounded wait, forced kill, bounded wait.
    pub async fn terminate_pid(&self, pid: u32) -> TerminateOutcome {
        let exited = |forced| TerminateOutcome {
            pid,
            state: LifecycleState::Exited,
            forced,
            reason: None,
        };
        let failed = |forced, reason: String| TerminateOutcome {
            pid,
            state: LifecycleState::TerminateFailed,
            forced,
            reason: Some(reason),
        };

        if !self.table.state(pid).is_alive() {
            debug!(pid, "Process already gone");
            return exited(false);
        }

        let graceful_sent = match self.table.terminate(pid) {
            SignalResult::Sent => true,
            SignalResult::NotFound => return exited(false),
            SignalResult::AccessDenied => {
                error!(pid, "Access denied terminating process");
                return failed(false, "access denied".to_string());
            }
            SignalResult::Failed(reason) => {
                warn!(pid, %reason, "Graceful terminate failed, killing");
                false
            }
        };

        if graceful_sent {
            let state = LifecycleState::GracefulShutdownRequested;
            debug!(pid, state = state.as_str(), "Waiting for graceful exit");

            let graceful_timeout = Duration::from_secs(self.settings.graceful_timeout_secs);
            if self.wait_for_exit(pid, graceful_timeout).await {
                info!(pid, "Process exited gracefully");
                return exited(false);
            }

            warn!(
                pid,
                timeout_secs = self.settings.graceful_timeout_secs,
                "Process ignored graceful terminate, killing"
            );
        }
        match self.table.kill(pid) {
            SignalResult::Sent => {}
            SignalResult::NotFound => return exited(true),
            SignalResult::AccessDenied => {
                error!(pid, "Access denied killing process");
                return failed(true, "access denied".to_string());
            }
            SignalResult::Failed(reason) => {
                error!(pid, %reason, "Kill failed");
                return failed(true, reason);
            }
        }
        let state = LifecycleState::ForcedKillRequested;
        debug!(pid, state = state.as_str(), "Waiting for forced exit");

        let force_timeout = Duration::from_secs(self.settings.force_timeout_secs);
        if self.wait_for_exit(pid, force_timeout).await {
            info!(pid, "Process killed");
            return exited(true);
        }

        error!(pid, "Process survived kill, possible zombie");
        failed(true, "still alive after kill".to_string())
    }

    /// Poll until `pid` is no longer running or `timeout` elapses.
    async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let poll = Duration::from_millis(self.settings.exit_poll_interval_ms.max(1));
        loop {
            if !self.table.state(pid).is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    fn log_zombies(&self, identity: &ProcessIdentity) {
        let zombies: Vec<u32> = self
            .table
            .list(&identity.name)
            .into_iter()
            .filter(|r| r.status == ProcessState::Zombie)
            .map(|r| r.pid)
            .collect();
        if zombies.is_empty() {
            debug!(process = %identity.name, "No zombie processes");
        } else {
            warn!(process = %identity.name, ?zombies, "Zombie processes detected");
        }
    }

    /// Launch `exe`.
    ///
    /// With `wait_for_start`, polls for a process with the executable's
    /// identity and returns its pid; otherwise returns the launcher pid.
    pub async fn start(&self, exe: &Path, wait_for_start: bool) -> ProcessResult<u32> {
        if !exe.exists() {
            error!(exe = %exe.display(), "Executable not found");
            return Err(ProcessError::ExecutableNotFound(exe.to_path_buf()));
        }

        info!(exe = %exe.display(), "Starting process");
        let launcher_pid = self.table.spawn(exe).map_err(|e| ProcessError::Spawn {
            path: exe.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !wait_for_start {
            info!(pid = launcher_pid, "Process launched without waiting");
            return Ok(launcher_pid);
        }

        let identity = ProcessIdentity::for_executable(exe)
            .ok_or_else(|| ProcessError::ExecutableNotFound(exe.to_path_buf()))?;
        let timeout = Duration::from_secs(self.settings.start_timeout_secs);
        let poll = Duration::from_millis(self.settings.start_poll_interval_ms.max(1));
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(record) = self.status(&identity).processes.first() {
                info!(process = %identity.name, pid = record.pid, "Process started");
                return Ok(record.pid);
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(poll).await;
        }

        error!(process = %identity.name, timeout_secs = self.settings.start_timeout_secs, "Process start timed out");
        Err(ProcessError::StartupTimeout {
            name: identity.name,
            timeout_secs: self.settings.start_timeout_secs,
        })
    }
}
