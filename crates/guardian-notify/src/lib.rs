//! Notifications for the terminal guardian.
//!
//! - `NotificationSink`: delivery seam (`FeishuSink`, `LogSink`)
//! - `AlertGate`: enabled flag, daily window and per-key debounce
//! - `Notifier`: gate + sink

pub mod error;
pub mod feishu;
pub mod gate;
pub mod sink;

pub use error::{NotifyError, NotifyResult};
pub use feishu::{FeishuSettings, FeishuSink};
pub use gate::{Alert, AlertGate, AlertKey, GateDecision, GateSettings, Notifier};
pub use sink::{BoxFuture, LogSink, NotificationSink, RecordingSink, SentNotification, Severity};
