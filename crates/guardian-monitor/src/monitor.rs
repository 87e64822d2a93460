//! The monitor loop.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use guardian_core::{Latency, ServerRole};
use guardian_notify::{Alert, AlertKey, GateDecision, Notifier, Severity};
use guardian_probe::Prober;
use guardian_process::{ProcessIdentity, ProcessSupervisor};
use guardian_registry::ServerDocument;
use guardian_telemetry::Metrics;
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorSettings;
use crate::error::MonitorResult;
use crate::state::{MonitorSnapshot, MonitorState};
use crate::status::StatusSink;

/// What one tick observed.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub running: bool,
    pub processes: usize,
    /// Probe result per role; `None` when the document names no server.
    pub market_data: Option<Latency>,
    pub order_routing: Option<Latency>,
    pub connected: bool,
    pub alerts: Vec<(AlertKey, GateDecision)>,
}

pub struct HealthMonitor {
    settings: MonitorSettings,
    supervisor: Arc<ProcessSupervisor>,
    identity: ProcessIdentity,
    document_path: PathBuf,
    prober: Arc<dyn Prober>,
    notifier: Notifier,
    status: Arc<dyn StatusSink>,
    snapshot: Arc<RwLock<MonitorSnapshot>>,
}

impl HealthMonitor {
    pub fn new(
        settings: MonitorSettings,
        supervisor: Arc<ProcessSupervisor>,
        identity: ProcessIdentity,
        document_path: PathBuf,
        prober: Arc<dyn Prober>,
        notifier: Notifier,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            settings,
            supervisor,
            identity,
            document_path,
            prober,
            notifier,
            status,
            snapshot: Arc::new(RwLock::new(MonitorSnapshot::default())),
        }
    }

    /// Copy of the latest published view.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.read().clone()
    }

    /// Run ticks until `shutdown` fires. An in-flight tick always finishes.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.settings.interval_secs,
            high_latency_ms = self.settings.high_latency_ms,
            process = %self.identity.name,
            "HealthMonitor started"
        );

        let mut state = MonitorState::default();
        let mut ticker = tokio::time::interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("HealthMonitor stopping");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.tick(&mut state).await {
                Ok(report) => {
                    debug!(
                        running = report.running,
                        connected = report.connected,
                        alerts = report.alerts.len(),
                        "Monitor tick complete"
                    );
                }
                Err(e) => {
                    state.tick_errors += 1;
                    Metrics::monitor_tick_error("network");
                    warn!(error = %e, "Monitor tick failed");
                    let mut snapshot = self.snapshot.write();
                    snapshot.last_error = Some(e.to_string());
                    snapshot.tick_errors = state.tick_errors;
                }
            }
        }
    }

    /// One monitoring pass.
    pub async fn tick(&self, state: &mut MonitorState) -> MonitorResult<TickReport> {
        state.ticks += 1;
        let mut alerts = Vec::new();

        // Liveness.
        let status = self.supervisor.status(&self.identity);
        let running = status.running;
        let processes = status.count();
        Metrics::terminal_running(running);

        if !running {
            self.log_unmatched_instances();
        }
        if state.last_running != Some(running) {
            info!(
                process = %self.identity.name,
                previous = ?state.last_running,
                running,
                processes,
                "Terminal liveness changed"
            );
            let alert = if running {
                Alert::new(
                    AlertKey::terminal_status(),
                    "Terminal started",
                    format!("{} is running with {} process(es)", self.identity.name, processes),
                    Severity::Success,
                )
            } else {
                Alert::new(
                    AlertKey::terminal_status(),
                    "Terminal stopped",
                    format!("{} exited or crashed", self.identity.name),
                    Severity::Warning,
                )
            };
            let key = alert.key.clone();
            alerts.push((key, self.notifier.alert(alert.transition()).await));
        }
        state.last_running = Some(running);
        self.status.status(&format!(
            "Terminal: {} ({} process(es))",
            if running { "running" } else { "not running" },
            processes
        ));
        {
            let mut snapshot = self.snapshot.write();
            snapshot.terminal_running = Some(running);
            snapshot.terminal_processes = processes;
            snapshot.last_tick_at = Some(Utc::now());
            snapshot.ticks = state.ticks;
        }

        // Connectivity of the servers named in the document.
        let selection = ServerDocument::load(&self.document_path)?.current_selection()?;
        let mut latencies = [None, None];
        for (slot, role) in ServerRole::ALL.into_iter().enumerate() {
            let Some(server) = selection.for_role(role) else {
                continue;
            };
            let outcome = self
                .prober
                .sample(&server.address, server.port, self.settings.probe_timeout())
                .await;
            Metrics::probe_sample(
                role.as_str(),
                outcome.elapsed().map(|d| d.as_secs_f64() * 1000.0),
            );
            let latency = outcome.as_latency();
            latencies[slot] = Some(latency);

            if latency.exceeds(self.settings.high_latency()) {
                let alert = Alert::new(
                    AlertKey::latency(role),
                    format!("High {} latency", role),
                    format!(
                        "{}:{} latency {}, consider switching servers",
                        server.address, server.port, latency
                    ),
                    Severity::Warning,
                );
                let key = alert.key.clone();
                alerts.push((key, self.notifier.alert(alert).await));
            }
        }

        let [market_data, order_routing] = latencies;
        let connected = latencies.iter().flatten().all(Latency::is_finite);
        if state.last_connected != Some(connected) {
            if connected {
                info!("Selected servers reachable");
            } else {
                warn!(?market_data, ?order_routing, "Selected server unreachable");
            }
        }
        state.last_connected = Some(connected);
        self.status.status(&format!(
            "Network: {}",
            if connected { "normal" } else { "degraded" }
        ));

        {
            let mut snapshot = self.snapshot.write();
            snapshot.connected = Some(connected);
            snapshot.market_data_latency = market_data;
            snapshot.order_routing_latency = order_routing;
            snapshot.last_error = None;
            snapshot.tick_errors = state.tick_errors;
        }

        Ok(TickReport {
            running,
            processes,
            market_data,
            order_routing,
            connected,
            alerts,
        })
    }

    /// Same-name processes outside the install dir.
    fn log_unmatched_instances(&self) {
        let by_name = ProcessIdentity::new(self.identity.name.clone(), None);
        let others = self.supervisor.find(&by_name);
        if others.is_empty() {
            return;
        }
        let paths: Vec<String> = others
            .iter()
            .map(|p| {
                format!(
                    "pid {}: {}",
                    p.pid,
                    p.exe_path
                        .as_ref()
                        .map(|e| e.display().to_string())
                        .unwrap_or_default()
                )
            })
            .collect();
        debug!(
            process = %self.identity.name,
            install_dir = ?self.identity.install_dir,
            ?paths,
            "Same-name processes found outside the install dir"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::RecordingStatusSink;
    use guardian_core::ProbeOutcome;
    use guardian_notify::{AlertGate, GateSettings, RecordingSink};
    use guardian_probe::MockProber;
    use guardian_process::{FakeProcessTable, KillBehavior, SupervisorSettings};
    use std::path::Path;
    use std::time::Duration;

    const EXE: &str = "/opt/qmt/bin.x64/XtMiniQmt.exe";
    const DOC: &str = r#"<Root><QuoterServers current_stock="md_10.0.0.1_55300" current_trade_stock="or_10.0.0.2_55310"></QuoterServers></Root>"#;

    struct Harness {
        monitor: HealthMonitor,
        table: Arc<FakeProcessTable>,
        prober: Arc<MockProber>,
        sink: Arc<RecordingSink>,
        status: Arc<RecordingStatusSink>,
        _dir: tempfile::TempDir,
    }

    fn harness(doc: &str) -> Harness {
        harness_with_gate(
            doc,
            GateSettings {
                window_start: "00:00:00".to_string(),
                window_end: "23:59:59".to_string(),
                ..GateSettings::default()
            },
        )
    }

    fn harness_with_gate(doc: &str, gate: GateSettings) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtquoterconfig.xml");
        std::fs::write(&path, doc).unwrap();

        let table = Arc::new(FakeProcessTable::new());
        let supervisor = Arc::new(ProcessSupervisor::new(table.clone(), SupervisorSettings::default()));
        let prober = Arc::new(
            MockProber::new()
                .with_latency_ms("10.0.0.1", 20)
                .with_latency_ms("10.0.0.2", 30),
        );
        let sink = Arc::new(RecordingSink::new());
        let gate = AlertGate::new(&gate);
        let status = Arc::new(RecordingStatusSink::new());
        let monitor = HealthMonitor::new(
            MonitorSettings::default(),
            supervisor,
            ProcessIdentity::new("XtMiniQmt.exe", Some(PathBuf::from("/opt/qmt"))),
            path,
            prober.clone(),
            Notifier::new(Arc::new(gate), sink.clone()),
            status.clone(),
        );
        Harness {
            monitor,
            table,
            prober,
            sink,
            status,
            _dir: dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_observation_alerts() {
        let h = harness(DOC);
        let mut state = MonitorState::default();

        let report = h.monitor.tick(&mut state).await.unwrap();
        assert!(!report.running);
        assert!(report.connected);
        assert_eq!(h.sink.titles(), vec!["Terminal stopped".to_string()]);
        assert!(h.status.messages().iter().any(|m| m.starts_with("Terminal: not running")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_delivered_despite_recent_alert() {
        let h = harness(DOC);
        let mut state = MonitorState::default();

        h.monitor.tick(&mut state).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        h.table.add(Path::new(EXE), KillBehavior::Exit);

        let report = h.monitor.tick(&mut state).await.unwrap();
        assert!(report.running);
        assert_eq!(
            report.alerts,
            vec![(AlertKey::terminal_status(), GateDecision::Deliver)]
        );
        assert_eq!(
            h.sink.titles(),
            vec!["Terminal stopped".to_string(), "Terminal started".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_transition_delivered_despite_recent_alert() {
        let h = harness(DOC);
        let pid = h.table.add(Path::new(EXE), KillBehavior::Exit);
        let mut state = MonitorState::default();

        h.monitor.tick(&mut state).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        h.table.exit(pid);

        let report = h.monitor.tick(&mut state).await.unwrap();
        assert!(!report.running);
        assert_eq!(
            report.alerts,
            vec![(AlertKey::terminal_status(), GateDecision::Deliver)]
        );
        assert_eq!(
            h.sink.titles(),
            vec!["Terminal started".to_string(), "Terminal stopped".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_transition_outside_window_not_sent() {
        let now = chrono::Local::now().time();
        let h = harness_with_gate(
            DOC,
            GateSettings {
                window_start: (now + chrono::Duration::hours(2)).format("%H:%M:%S").to_string(),
                window_end: (now + chrono::Duration::hours(3)).format("%H:%M:%S").to_string(),
                ..GateSettings::default()
            },
        );
        let pid = h.table.add(Path::new(EXE), KillBehavior::Exit);
        let mut state = MonitorState::default();

        h.monitor.tick(&mut state).await.unwrap();
        h.table.exit(pid);

        let report = h.monitor.tick(&mut state).await.unwrap();
        assert_eq!(
            report.alerts,
            vec![(AlertKey::terminal_status(), GateDecision::OutsideWindow)]
        );
        assert_eq!(h.sink.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_state_sends_nothing() {
        let h = harness(DOC);
        h.table.add(Path::new(EXE), KillBehavior::Exit);
        let mut state = MonitorState::default();

        h.monitor.tick(&mut state).await.unwrap();
        h.monitor.tick(&mut state).await.unwrap();
        assert_eq!(h.sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_latency_debounced_per_role() {
        let h = harness(DOC);
        h.table.add(Path::new(EXE), KillBehavior::Exit);
        h.prober.set_fixed("10.0.0.1", ProbeOutcome::Reachable(Duration::from_millis(250)));
        h.prober.set_fixed("10.0.0.2", ProbeOutcome::Unreachable);
        let mut state = MonitorState::default();

        let first = h.monitor.tick(&mut state).await.unwrap();
        assert!(!first.connected);
        assert_eq!(first.order_routing, Some(Latency::Infinite));
        assert!(first
            .alerts
            .contains(&(AlertKey::latency(ServerRole::MarketData), GateDecision::Deliver)));
        assert!(first
            .alerts
            .contains(&(AlertKey::latency(ServerRole::OrderRouting), GateDecision::Deliver)));

        tokio::time::advance(Duration::from_secs(10)).await;
        let second = h.monitor.tick(&mut state).await.unwrap();
        assert!(second
            .alerts
            .iter()
            .all(|(_, decision)| *decision == GateDecision::Debounced));

        // started + two latency alerts
        assert_eq!(h.sink.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_document_fails_tick_after_liveness() {
        let h = harness(DOC);
        std::fs::remove_file(&h.monitor.document_path).unwrap();
        let mut state = MonitorState::default();

        assert!(h.monitor.tick(&mut state).await.is_err());
        assert_eq!(state.last_running, Some(false));
        assert_eq!(h.monitor.snapshot().terminal_running, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let h = harness(DOC);
        let token = CancellationToken::new();
        let monitor = Arc::new(h.monitor);

        let handle = {
            let monitor = monitor.clone();
            let token = token.clone();
            tokio::spawn(async move { monitor.run(token).await })
        };

        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        handle.await.unwrap();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.ticks, 3);
        assert_eq!(snapshot.connected, Some(true));
    }
}
