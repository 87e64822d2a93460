//! Daily jobs at fixed local times.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use guardian_core::parse_time_of_day;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::error::{AppError, AppResult};
use crate::orchestrator::Orchestrator;
use crate::tasks::Submission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    RestartTerminal,
    ShutdownTerminal,
    RestartClient,
    ShutdownClient,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::RestartTerminal => "restart-terminal",
            JobKind::ShutdownTerminal => "shutdown-terminal",
            JobKind::RestartClient => "restart-client",
            JobKind::ShutdownClient => "shutdown-client",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DailyScheduler {
    jobs: Vec<(NaiveTime, JobKind)>,
}

impl DailyScheduler {
    /// Parse the configured times. Empty entries are skipped.
    pub fn from_config(config: &ScheduleConfig) -> AppResult<Self> {
        let mut jobs = Vec::new();
        for (raw, kind) in [
            (&config.terminal_restart_time, JobKind::RestartTerminal),
            (&config.terminal_shutdown_time, JobKind::ShutdownTerminal),
            (&config.client_restart_time, JobKind::RestartClient),
            (&config.client_shutdown_time, JobKind::ShutdownClient),
        ] {
            let parsed = parse_time_of_day(raw)
                .map_err(|e| AppError::Config(format!("schedule {kind}: {e}")))?;
            if let Some(at) = parsed {
                jobs.push((at, kind));
            }
        }
        Ok(Self { jobs })
    }

    pub fn jobs(&self) -> &[(NaiveTime, JobKind)] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Earliest job strictly after `now`. Ties go to the first configured job.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<(NaiveDateTime, JobKind)> {
        let mut best: Option<(NaiveDateTime, JobKind)> = None;
        for &(at, kind) in &self.jobs {
            let mut candidate = now.date().and_time(at);
            if candidate <= now {
                candidate += ChronoDuration::days(1);
            }
            if best.map_or(true, |(current, _)| candidate < current) {
                best = Some((candidate, kind));
            }
        }
        best
    }

    /// Fire jobs until `shutdown`. Jobs go through the orchestrator's task
    /// keys, so a job overlapping a running action for the same target is
    /// skipped.
    pub async fn run(&self, orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) {
        if self.jobs.is_empty() {
            info!("No scheduled jobs");
            return;
        }
        for (at, kind) in &self.jobs {
            info!(job = %kind, at = %at, "Scheduled daily job");
        }

        // Last fired instant; a wake-up slightly before the wall clock
        // reaches it must not fire the same job twice.
        let mut cursor = Local::now().naive_local();
        loop {
            let now = Local::now().naive_local().max(cursor);
            let Some((due, kind)) = self.next_after(now) else {
                return;
            };
            let wait = (due - Local::now().naive_local())
                .to_std()
                .unwrap_or_default();

            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Scheduler stopping");
                    return;
                }
                () = tokio::time::sleep(wait) => {}
            }

            cursor = due;
            info!(job = %kind, due = %due, "Running scheduled job");
            let submission = match kind {
                JobKind::RestartTerminal => orchestrator.submit_restart_terminal(),
                JobKind::ShutdownTerminal => orchestrator.submit_shutdown_terminal(),
                JobKind::RestartClient => orchestrator.submit_restart_client(true),
                JobKind::ShutdownClient => orchestrator.submit_shutdown_client(),
            };
            if submission == Submission::AlreadyRunning {
                warn!(job = %kind, "Scheduled job skipped, target busy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn scheduler() -> DailyScheduler {
        DailyScheduler::from_config(&ScheduleConfig {
            enabled: true,
            terminal_restart_time: "09:28:00".to_string(),
            terminal_shutdown_time: "15:10:00".to_string(),
            client_restart_time: "09:35:00".to_string(),
            client_shutdown_time: String::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_empty_times_disable_jobs() {
        let s = scheduler();
        assert_eq!(s.jobs().len(), 3);
        assert!(!s.jobs().iter().any(|(_, k)| *k == JobKind::ShutdownClient));
    }

    #[test]
    fn test_next_after_same_day() {
        let s = scheduler();
        assert_eq!(
            s.next_after(at(8, 0, 0)),
            Some((at(9, 28, 0), JobKind::RestartTerminal))
        );
        assert_eq!(
            s.next_after(at(9, 30, 0)),
            Some((at(9, 35, 0), JobKind::RestartClient))
        );
    }

    #[test]
    fn test_next_after_is_strict() {
        let s = scheduler();
        assert_eq!(
            s.next_after(at(9, 28, 0)),
            Some((at(9, 35, 0), JobKind::RestartClient))
        );
    }

    #[test]
    fn test_next_after_wraps_to_tomorrow() {
        let s = scheduler();
        let (due, kind) = s.next_after(at(16, 0, 0)).unwrap();
        assert_eq!(kind, JobKind::RestartTerminal);
        assert_eq!(due, at(9, 28, 0) + ChronoDuration::days(1));
    }

    #[test]
    fn test_tie_goes_to_first_job() {
        let s = DailyScheduler::from_config(&ScheduleConfig {
            enabled: true,
            terminal_restart_time: "09:30:00".to_string(),
            terminal_shutdown_time: String::new(),
            client_restart_time: "09:30:00".to_string(),
            client_shutdown_time: String::new(),
        })
        .unwrap();
        assert_eq!(s.next_after(at(9, 0, 0)).unwrap().1, JobKind::RestartTerminal);
    }

    #[test]
    fn test_invalid_time_rejected() {
        let config = ScheduleConfig {
            terminal_restart_time: "9am".to_string(),
            ..ScheduleConfig::default()
        };
        assert!(DailyScheduler::from_config(&config).is_err());
    }

    #[test]
    fn test_no_jobs() {
        let config = ScheduleConfig {
            enabled: true,
            terminal_restart_time: String::new(),
            terminal_shutdown_time: String::new(),
            client_restart_time: String::new(),
            client_shutdown_time: String::new(),
        };
        let s = DailyScheduler::from_config(&config).unwrap();
        assert!(s.is_empty());
        assert_eq!(s.next_after(at(9, 0, 0)), None);
    }
}
