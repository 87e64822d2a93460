//! Process health evaluation.

use guardian_core::{ProcessRecord, ProcessState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A problem found by [`HealthReport::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthIssue {
    NotRunning,
    MultipleInstances(usize),
    Zombie(u32),
    /// Advisory only; does not make the report unhealthy.
    HighMemory { pid: u32, memory_mb: f64 },
}

impl HealthIssue {
    pub fn is_advisory(&self) -> bool {
        matches!(self, Self::HighMemory { .. })
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::NotRunning => "check that the process starts correctly",
            Self::MultipleInstances(_) => "terminate the extra instances",
            Self::Zombie(_) => "reboot the host to reap zombie processes",
            Self::HighMemory { .. } => "watch memory usage and consider a restart",
        }
    }
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => f.write_str("process not running"),
            Self::MultipleInstances(n) => write!(f, "{} instances running", n),
            Self::Zombie(pid) => write!(f, "zombie process (pid={})", pid),
            Self::HighMemory { pid, memory_mb } => {
                write!(f, "high memory usage: {:.1}MB (pid={})", memory_mb, pid)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub name: String,
    pub healthy: bool,
    pub issues: Vec<HealthIssue>,
    pub recommendations: Vec<String>,
    pub processes: Vec<ProcessRecord>,
}

impl HealthReport {
    /// Evaluate the processes matching one identity.
    pub fn evaluate(name: &str, processes: Vec<ProcessRecord>, memory_warning_mb: f64) -> Self {
        let mut issues = Vec::new();

        if processes.is_empty() {
            issues.push(HealthIssue::NotRunning);
        }
        if processes.len() > 1 {
            issues.push(HealthIssue::MultipleInstances(processes.len()));
        }
        for process in &processes {
            if process.status == ProcessState::Zombie {
                issues.push(HealthIssue::Zombie(process.pid));
            }
            let memory_mb = process.resident_memory_mb();
            if memory_mb > memory_warning_mb {
                issues.push(HealthIssue::HighMemory {
                    pid: process.pid,
                    memory_mb,
                });
            }
        }

        let healthy = issues.iter().all(HealthIssue::is_advisory);
        let recommendations = issues
            .iter()
            .map(|i| i.recommendation().to_string())
            .collect();

        Self {
            name: name.to_string(),
            healthy,
            issues,
            recommendations,
            processes,
        }
    }

    /// One-line summary for logs and notifications.
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return format!("{}: healthy ({} process(es))", self.name, self.processes.len());
        }
        let issues: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        format!(
            "{}: {} - {}",
            self.name,
            if self.healthy { "healthy" } else { "unhealthy" },
            issues.join("; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, status: ProcessState, memory_mb: u64) -> ProcessRecord {
        ProcessRecord {
            pid,
            name: "XtMiniQmt.exe".to_string(),
            exe_path: None,
            status,
            start_time: None,
            resident_memory: memory_mb * 1024 * 1024,
        }
    }

    #[test]
    fn test_not_running_is_unhealthy() {
        let report = HealthReport::evaluate("XtMiniQmt.exe", vec![], 1000.0);
        assert!(!report.healthy);
        assert_eq!(report.issues, vec![HealthIssue::NotRunning]);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_high_memory_is_advisory() {
        let report = HealthReport::evaluate(
            "XtMiniQmt.exe",
            vec![record(1, ProcessState::Running, 1500)],
            1000.0,
        );
        assert!(report.healthy);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].is_advisory());
    }

    #[test]
    fn test_multiple_and_zombie() {
        let report = HealthReport::evaluate(
            "XtMiniQmt.exe",
            vec![
                record(1, ProcessState::Running, 10),
                record(2, ProcessState::Zombie, 0),
            ],
            1000.0,
        );
        assert!(!report.healthy);
        assert!(report.issues.contains(&HealthIssue::MultipleInstances(2)));
        assert!(report.issues.contains(&HealthIssue::Zombie(2)));
        assert!(report.summary().contains("unhealthy"));
    }
}
