//! Notification error types.
//!
//! Sinks never surface these to callers; they are logged and turned into
//! `false`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook URL not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Webhook rejected message (code={code}): {msg}")]
    Rejected { code: i64, msg: String },
}

pub type NotifyResult<T> = Result<T, NotifyError>;
