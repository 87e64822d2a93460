//! Idempotent actions over the terminal and the client.
//!
//! The orchestrator is the only component that both supervises processes and
//! rewrites the server document. It always terminates the terminal before
//! selecting servers.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use guardian_core::{Measurement, SelectionResult, ServerRole};
use guardian_monitor::StatusSink;
use guardian_notify::{Alert, AlertKey, Notifier, Severity};
use guardian_process::{HealthReport, ProcessIdentity, ProcessSupervisor, TerminateReport};
use guardian_registry::{ConfigRewriter, RewriteOutcome, ServerCatalog, ServerSelector};
use guardian_telemetry::Metrics;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::tasks::{Submission, TaskRunner};

/// Task key for terminal actions.
pub const TERMINAL_KEY: &str = "terminal";
/// Task key for client actions.
pub const CLIENT_KEY: &str = "client";

/// Result of a terminal restart.
#[derive(Debug, Clone, Serialize)]
pub struct RestartReport {
    pub terminate: TerminateReport,
    pub selection: Option<SelectionResult>,
    #[serde(skip)]
    pub rewrite: Option<RewriteOutcome>,
    pub pid: Option<u32>,
    pub errors: Vec<String>,
}

impl RestartReport {
    fn new(terminate: TerminateReport) -> Self {
        Self {
            terminate,
            selection: None,
            rewrite: None,
            pid: None,
            errors: Vec::new(),
        }
    }

    /// Started, with no failure along the way.
    pub fn is_success(&self) -> bool {
        self.pid.is_some() && self.errors.is_empty()
    }
}

/// Result of a client restart.
#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub terminate: TerminateReport,
    pub removed: Vec<PathBuf>,
    pub pid: Option<u32>,
    pub errors: Vec<String>,
}

impl ClientReport {
    pub fn is_success(&self) -> bool {
        self.pid.is_some() && self.errors.is_empty()
    }
}

/// Health of both managed programs.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub terminal: HealthReport,
    pub client: Option<HealthReport>,
}

fn describe(measurement: Option<&Measurement>) -> String {
    measurement
        .map(Measurement::describe)
        .unwrap_or_else(|| "unchanged".to_string())
}

pub struct Orchestrator {
    config: Arc<AppConfig>,
    supervisor: Arc<ProcessSupervisor>,
    selector: ServerSelector,
    notifier: Notifier,
    status: Arc<dyn StatusSink>,
    tasks: TaskRunner,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        supervisor: Arc<ProcessSupervisor>,
        selector: ServerSelector,
        notifier: Notifier,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            config,
            supervisor,
            selector,
            notifier,
            status,
            tasks: TaskRunner::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tasks(&self) -> &TaskRunner {
        &self.tasks
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn client_identity(&self) -> AppResult<ProcessIdentity> {
        self.config
            .client_identity()
            .ok_or_else(|| AppError::Config("client.executable is not configured".to_string()))
    }

    async fn notify(&self, key: AlertKey, title: &str, body: String, severity: Severity) {
        self.notifier
            .alert(Alert::new(key, title, body, severity).transition())
            .await;
    }

    /// Terminate, select, rewrite, start.
    ///
    /// Terminate, catalog and rewrite failures are recorded and the restart
    /// continues; only the start outcome decides whether a terminal runs.
    pub async fn restart_terminal(&self) -> RestartReport {
        let identity = self.config.terminal_identity();
        info!(process = %identity.name, "Restarting terminal");
        self.status.status("Restarting terminal...");

        let terminate = self.supervisor.terminate_by_name(&identity).await;
        let mut report = RestartReport::new(terminate);
        if let Err(e) = report.terminate.ensure_success() {
            warn!(error = %e, "Terminal terminate incomplete, continuing");
            report.errors.push(e.to_string());
        }

        if self.supervisor.is_running(&identity) {
            // Never rewrite under a live terminal.
            let message = "terminal still running, server selection skipped".to_string();
            error!("{}", message);
            report.errors.push(message);
        } else {
            self.select_and_apply(&mut report).await;
        }

        match self
            .supervisor
            .start(&self.config.terminal_executable(), true)
            .await
        {
            Ok(pid) => report.pid = Some(pid),
            Err(e) => {
                error!(error = %e, "Terminal start failed");
                report.errors.push(e.to_string());
            }
        }

        let success = report.is_success();
        Metrics::restart(TERMINAL_KEY, success);
        let (md, or) = match &report.selection {
            Some(s) => (describe(s.market_data.as_ref()), describe(s.order_routing.as_ref())),
            None => ("unchanged".to_string(), "unchanged".to_string()),
        };
        if report.pid.is_some() {
            self.notify(
                AlertKey::restart(TERMINAL_KEY),
                "Terminal restarted",
                format!(
                    "Market data: {}\nOrder routing: {}{}",
                    md,
                    or,
                    if report.errors.is_empty() {
                        String::new()
                    } else {
                        format!("\nWarnings: {}", report.errors.join("; "))
                    }
                ),
                if success { Severity::Success } else { Severity::Warning },
            )
            .await;
            self.status.status("Terminal restarted");
        } else {
            self.notify(
                AlertKey::restart(TERMINAL_KEY),
                "Terminal restart failed",
                report.errors.join("; "),
                Severity::Error,
            )
            .await;
            self.status.status("Terminal restart failed");
        }
        report
    }

    async fn select_and_apply(&self, report: &mut RestartReport) {
        let path = self.config.document_path();
        let endpoints = match ServerCatalog::load(&path, self.config.selection.catalog_policy()) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = %e, "Server catalog unavailable, keeping current servers");
                report.errors.push(e.to_string());
                return;
            }
        };

        let selection = self.selector.select(&endpoints).await;
        self.status.servers(
            &describe(selection.for_role(ServerRole::MarketData)),
            &describe(selection.for_role(ServerRole::OrderRouting)),
        );

        match ConfigRewriter::apply(&path, &selection) {
            Ok(outcome) => report.rewrite = Some(outcome),
            Err(e) => {
                error!(error = %e, "Server document rewrite failed");
                report.errors.push(e.to_string());
            }
        }
        report.selection = Some(selection);
    }

    pub async fn shutdown_terminal(&self) -> TerminateReport {
        let report = self
            .supervisor
            .terminate_by_name(&self.config.terminal_identity())
            .await;
        self.status.status(&format!(
            "Terminal shutdown: {} succeeded, {} failed",
            report.succeeded, report.failed
        ));
        report
    }

    /// Remove the configured client data folders. Missing folders are skipped.
    pub fn clean_client_data(&self) -> AppResult<Vec<PathBuf>> {
        let base = &self.config.client.data_base_path;
        if base.as_os_str().is_empty() {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        for folder in &self.config.client.data_folders {
            let folder = folder.trim();
            if folder.is_empty() {
                continue;
            }
            let path = base.join(folder);
            if !path.exists() {
                continue;
            }
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
            info!(path = %path.display(), "Removed client data");
            removed.push(path);
        }
        Ok(removed)
    }

    /// Terminate the client, optionally clean its data, start it.
    pub async fn restart_client(&self, clean_data: bool) -> AppResult<ClientReport> {
        let identity = self.client_identity()?;
        info!(process = %identity.name, clean_data, "Restarting client");
        self.status.status("Restarting client...");

        let terminate = self.supervisor.terminate_by_name(&identity).await;
        let mut report = ClientReport {
            terminate,
            removed: Vec::new(),
            pid: None,
            errors: Vec::new(),
        };
        if let Err(e) = report.terminate.ensure_success() {
            report.errors.push(e.to_string());
        }

        if clean_data {
            match self.clean_client_data() {
                Ok(removed) => report.removed = removed,
                Err(e) => {
                    error!(error = %e, "Client data cleanup failed");
                    report.errors.push(e.to_string());
                }
            }
        }

        match self.supervisor.start(&self.config.client.executable, true).await {
            Ok(pid) => report.pid = Some(pid),
            Err(e) => {
                error!(error = %e, "Client start failed");
                report.errors.push(e.to_string());
            }
        }

        let success = report.is_success();
        Metrics::restart(CLIENT_KEY, success);
        let (title, severity) = if report.pid.is_some() {
            ("Client restarted", Severity::Success)
        } else {
            ("Client restart failed", Severity::Error)
        };
        let body = if report.errors.is_empty() {
            format!("{} removed data folder(s)", report.removed.len())
        } else {
            report.errors.join("; ")
        };
        self.notify(AlertKey::restart(CLIENT_KEY), title, body, severity).await;
        self.status.status(title);
        Ok(report)
    }

    pub async fn shutdown_client(&self) -> AppResult<TerminateReport> {
        let identity = self.client_identity()?;
        let report = self.supervisor.terminate_by_name(&identity).await;
        self.status.status(&format!(
            "Client shutdown: {} succeeded, {} failed",
            report.succeeded, report.failed
        ));
        Ok(report)
    }

    /// Restart the terminal, wait, then restart the client when configured.
    pub async fn startup_restart(&self) {
        let terminal = self.restart_terminal().await;
        info!(success = terminal.is_success(), "Startup terminal restart finished");
        if self.config.client_identity().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(self.config.startup.client_delay_secs)).await;
        if let Err(e) = self.restart_client(true).await {
            error!(error = %e, "Startup client restart failed");
        }
    }

    /// Measure the catalog without touching the terminal or the document.
    pub async fn probe_catalog(&self) -> AppResult<Vec<Measurement>> {
        let endpoints = ServerCatalog::load(
            &self.config.document_path(),
            self.config.selection.catalog_policy(),
        )?;
        Ok(self.selector.measure_all(&endpoints).await)
    }

    pub fn health(&self) -> HealthSummary {
        HealthSummary {
            terminal: self.supervisor.health_report(&self.config.terminal_identity()),
            client: self
                .config
                .client_identity()
                .map(|identity| self.supervisor.health_report(&identity)),
        }
    }

    /// Run `action` now under `key`. Fails with `AlreadyRunning` while another
    /// action for the same target is in flight.
    pub async fn exclusive<F, T>(&self, key: &str, action: F) -> AppResult<T>
    where
        F: Future<Output = T>,
    {
        self.tasks
            .run_exclusive(key, action)
            .await
            .ok_or_else(|| AppError::AlreadyRunning(key.to_string()))
    }

    /// Queue a terminal restart in the background.
    pub fn submit_restart_terminal(self: &Arc<Self>) -> Submission {
        let this = Arc::clone(self);
        self.tasks.submit(TERMINAL_KEY, async move {
            this.restart_terminal().await;
        })
    }

    pub fn submit_shutdown_terminal(self: &Arc<Self>) -> Submission {
        let this = Arc::clone(self);
        self.tasks.submit(TERMINAL_KEY, async move {
            this.shutdown_terminal().await;
        })
    }

    pub fn submit_restart_client(self: &Arc<Self>, clean_data: bool) -> Submission {
        let this = Arc::clone(self);
        self.tasks.submit(CLIENT_KEY, async move {
            if let Err(e) = this.restart_client(clean_data).await {
                error!(error = %e, "Client restart failed");
            }
        })
    }

    pub fn submit_shutdown_client(self: &Arc<Self>) -> Submission {
        let this = Arc::clone(self);
        self.tasks.submit(CLIENT_KEY, async move {
            if let Err(e) = this.shutdown_client().await {
                error!(error = %e, "Client shutdown failed");
            }
        })
    }

    /// Runs under the terminal key; the client restart inside it is not keyed.
    pub fn submit_startup_restart(self: &Arc<Self>) -> Submission {
        let this = Arc::clone(self);
        self.tasks.submit(TERMINAL_KEY, async move {
            this.startup_restart().await;
        })
    }
}
