//! Process lifecycle supervision.
//!
//! Finds processes by identity (exact executable name plus install-dir
//! containment), terminates them gracefully with a forced fallback, starts
//! executables and reports health. Never restarts anything on its own.

pub mod error;
pub mod health;
pub mod identity;
pub mod supervisor;
pub mod table;

pub use error::{ProcessError, ProcessResult};
pub use health::{HealthIssue, HealthReport};
pub use identity::{normalize_path, ProcessIdentity};
pub use supervisor::{
    LifecycleState, ProcessStatusReport, ProcessSupervisor, SupervisorSettings, TerminateOutcome,
    TerminateReport,
};
pub use table::{FakeProcessTable, KillBehavior, ProcessTable, SignalResult, SystemProcessTable};
