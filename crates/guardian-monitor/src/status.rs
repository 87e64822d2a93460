//! Status push seam towards whatever presents the guardian's state.

use parking_lot::Mutex;
use tracing::info;

pub trait StatusSink: Send + Sync {
    /// One-line status message.
    fn status(&self, message: &str);

    /// Descriptions of the servers chosen for each role.
    fn servers(&self, market_data: &str, order_routing: &str);
}

/// Writes status updates to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status(&self, message: &str) {
        info!(target: "guardian::status", "{}", message);
    }

    fn servers(&self, market_data: &str, order_routing: &str) {
        info!(target: "guardian::status", market_data, order_routing, "Selected servers");
    }
}

/// Records every update, for tests.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    messages: Mutex<Vec<String>>,
    servers: Mutex<Vec<(String, String)>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn servers_updates(&self) -> Vec<(String, String)> {
        self.servers.lock().clone()
    }
}

impl StatusSink for RecordingStatusSink {
    fn status(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }

    fn servers(&self, market_data: &str, order_routing: &str) {
        self.servers
            .lock()
            .push((market_data.to_string(), order_routing.to_string()));
    }
}
