//! Feishu (Lark) group-bot webhook sink.

use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{NotifyError, NotifyResult};
use crate::sink::{BoxFuture, NotificationSink, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuSettings {
    /// Empty disables delivery.
    #[serde(default)]
    pub webhook_url: String,
    /// Mention everyone in the group.
    #[serde(default)]
    pub at_all: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for FeishuSettings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            at_all: false,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Interactive card message.
pub fn build_card(title: &str, body: &str, severity: Severity, at_all: bool, timestamp: &str) -> Value {
    let mut elements = vec![
        json!({
            "tag": "div",
            "text": { "tag": "plain_text", "content": body }
        }),
        json!({
            "tag": "div",
            "text": { "tag": "plain_text", "content": format!("Time: {}", timestamp) }
        }),
    ];
    if at_all {
        elements.push(json!({
            "tag": "div",
            "text": { "tag": "lark_md", "content": "<at user_id=\"all\">all</at>" }
        }));
    }

    json!({
        "msg_type": "interactive",
        "card": {
            "config": { "wide_screen_mode": true },
            "header": {
                "title": { "tag": "plain_text", "content": title },
                "template": severity.color()
            },
            "elements": elements
        }
    })
}

pub struct FeishuSink {
    client: Client,
    settings: FeishuSettings,
}

impl FeishuSink {
    pub fn new(settings: FeishuSettings) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn is_configured(&self) -> bool {
        !self.settings.webhook_url.trim().is_empty()
    }

    async fn post_once(&self, message: &Value) -> NotifyResult<()> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured);
        }
        let response = self
            .client
            .post(self.settings.webhook_url.trim())
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        let body: WebhookResponse = response.json().await?;
        if body.code != 0 {
            return Err(NotifyError::Rejected {
                code: body.code,
                msg: body.msg,
            });
        }
        Ok(())
    }

    async fn deliver(&self, title: &str, body: &str, severity: Severity) -> bool {
        if !self.is_configured() {
            debug!(%title, "Webhook URL not configured, skipping notification");
            return false;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let message = build_card(title, body, severity, self.settings.at_all, &timestamp);
        let attempts = self.settings.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.post_once(&message).await {
                Ok(()) => {
                    info!(%title, attempt, "Notification delivered");
                    return true;
                }
                // Rejections are permanent.
                Err(e @ NotifyError::Rejected { .. }) => {
                    warn!(%title, error = %e, "Notification rejected");
                    return false;
                }
                Err(e) => {
                    warn!(%title, attempt, attempts, error = %e, "Notification attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.settings.retry_delay_ms)).await;
                    }
                }
            }
        }
        false
    }
}

impl NotificationSink for FeishuSink {
    fn send<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, bool> {
        Box::pin(self.deliver(title, body, severity))
    }
}
