//! Application wiring: production seams, background loops, shutdown.
//!
//! The monitor and the schedule each run in their own [`LoopSlot`] and can be
//! started and stopped independently.

use std::sync::Arc;

use guardian_monitor::{HealthMonitor, LogStatusSink, StatusSink};
use guardian_notify::{AlertGate, FeishuSink, LogSink, NotificationSink, Notifier};
use guardian_probe::{Prober, TcpProber};
use guardian_process::{ProcessSupervisor, ProcessTable, SystemProcessTable};
use guardian_registry::ServerSelector;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::orchestrator::Orchestrator;
use crate::scheduler::DailyScheduler;
use crate::tasks::{LoopSlot, Submission};

pub struct Application {
    config: Arc<AppConfig>,
    orchestrator: Arc<Orchestrator>,
    monitor: Arc<HealthMonitor>,
    scheduler: DailyScheduler,
    monitor_loop: LoopSlot,
    schedule_loop: LoopSlot,
}

impl Application {
    /// Build with the OS process table, TCP probing and the configured
    /// webhook (log only when no URL is set).
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let feishu = FeishuSink::new(config.notification.feishu.clone())?;
        let sink: Arc<dyn NotificationSink> = if feishu.is_configured() {
            Arc::new(feishu)
        } else {
            warn!("Webhook URL not configured, notifications go to the log");
            Arc::new(LogSink)
        };
        Self::with_seams(
            config,
            Arc::new(SystemProcessTable::new()),
            Arc::new(TcpProber::new()),
            sink,
            Arc::new(LogStatusSink),
        )
    }

    pub fn with_seams(
        config: AppConfig,
        table: Arc<dyn ProcessTable>,
        prober: Arc<dyn Prober>,
        sink: Arc<dyn NotificationSink>,
        status: Arc<dyn StatusSink>,
    ) -> AppResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let scheduler = DailyScheduler::from_config(&config.schedule)?;

        let supervisor = Arc::new(ProcessSupervisor::new(table, config.supervisor.clone()));
        let gate = Arc::new(AlertGate::new(&config.notification.gate));
        let notifier = Notifier::new(gate, sink);
        let selector = ServerSelector::new(Arc::clone(&prober), config.selection.probe.clone());

        let monitor = Arc::new(HealthMonitor::new(
            config.monitor.clone(),
            Arc::clone(&supervisor),
            config.terminal_identity(),
            config.document_path(),
            prober,
            notifier.clone(),
            Arc::clone(&status),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&config),
            supervisor,
            selector,
            notifier,
            status,
        ));

        Ok(Self {
            config,
            orchestrator,
            monitor,
            scheduler,
            monitor_loop: LoopSlot::new("monitor"),
            schedule_loop: LoopSlot::new("schedule"),
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.start();

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }

        self.stop().await;
        Ok(())
    }

    /// Start the enabled loops and submit the startup restart.
    pub fn start(&self) {
        if self.config.monitor.enabled {
            self.start_monitoring();
        } else {
            info!("Health monitor disabled");
        }

        if self.config.schedule.enabled {
            self.start_schedule();
        } else {
            info!("Daily schedule disabled");
        }

        if self.config.startup.restart_on_startup
            && self.orchestrator.submit_startup_restart() == Submission::AlreadyRunning
        {
            warn!("Startup restart skipped, terminal action in flight");
        }

        info!(
            monitor = self.config.monitor.enabled,
            schedule = self.config.schedule.enabled,
            "Guardian running"
        );
    }

    /// Stop both loops and wait for in-flight actions to finish.
    pub async fn stop(&self) {
        self.stop_monitoring().await;
        self.stop_schedule().await;
        self.orchestrator.tasks().shutdown().await;
        info!("Guardian stopped");
    }

    /// Start the health monitor loop. `false` when it is already running.
    pub fn start_monitoring(&self) -> bool {
        let monitor = Arc::clone(&self.monitor);
        self.monitor_loop
            .start(move |token| async move { monitor.run(token).await })
    }

    /// Stop the health monitor after its current tick.
    pub async fn stop_monitoring(&self) -> bool {
        self.monitor_loop.stop().await
    }

    pub fn is_monitoring_running(&self) -> bool {
        self.monitor_loop.is_running()
    }

    /// Start the daily schedule loop. `false` when it is already running.
    pub fn start_schedule(&self) -> bool {
        let scheduler = self.scheduler.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        self.schedule_loop
            .start(move |token| async move { scheduler.run(orchestrator, token).await })
    }

    /// Stop the daily schedule. A job already submitted keeps running.
    pub async fn stop_schedule(&self) -> bool {
        self.schedule_loop.stop().await
    }

    pub fn is_schedule_running(&self) -> bool {
        self.schedule_loop.is_running()
    }
}
