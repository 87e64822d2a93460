//! Process supervision error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Process {name} did not appear within {timeout_secs}s")]
    StartupTimeout { name: String, timeout_secs: u64 },

    #[error("Failed to terminate {name}: {failed} process(es) still alive")]
    TerminateFailed { name: String, failed: usize },

    #[error("Failed to spawn {}: {reason}", .path.display())]
    Spawn { path: PathBuf, reason: String },
}

pub type ProcessResult<T> = Result<T, ProcessError>;
