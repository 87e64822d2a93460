//! Notification sink seam.

use std::fmt;
use std::pin::Pin;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

impl Severity {
    /// Card header color.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Info => "blue",
            Self::Warning => "orange",
            Self::Error => "red",
            Self::Success => "green",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers notifications.
///
/// Must never fail: errors are logged and reported as `false`. Safe to call
/// repeatedly.
pub trait NotificationSink: Send + Sync {
    fn send<'a>(&'a self, title: &'a str, body: &'a str, severity: Severity)
        -> BoxFuture<'a, bool>;
}

/// Sink that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match severity {
                Severity::Error => error!(%title, %body, "Notification"),
                Severity::Warning => warn!(%title, %body, "Notification"),
                Severity::Info | Severity::Success => info!(%title, %body, %severity, "Notification"),
            }
            true
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

/// Sink that records every message, for tests.
#[derive(Debug)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentNotification>>,
    delivered: bool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            delivered: true,
        }
    }

    /// A sink whose deliveries all report failure.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            delivered: false,
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().iter().map(|n| n.title.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl NotificationSink for RecordingSink {
    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, bool> {
        self.sent.lock().push(SentNotification {
            title: title.to_string(),
            body: body.to_string(),
            severity,
        });
        let delivered = self.delivered;
        Box::pin(async move { delivered })
    }
}
