//! Transient view of an OS process. Never cached across polls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    Running,
    Zombie,
    NotFound,
}

impl ProcessState {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub exe_path: Option<PathBuf>,
    pub status: ProcessState,
    pub start_time: Option<DateTime<Utc>>,
    /// Resident memory in bytes.
    pub resident_memory: u64,
}

impl ProcessRecord {
    pub fn resident_memory_mb(&self) -> f64 {
        self.resident_memory as f64 / (1024.0 * 1024.0)
    }
}
