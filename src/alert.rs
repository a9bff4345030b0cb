//! Alert delivery.
//!
//! An [`AlertSink`] receives the notification text for every accepted
//! answer of an alert-enabled query. Delivery failures are returned to the
//! caller, which logs and counts them; they never reach the user who asked.
//!
//! | `alerts.sink` | Sink |
//! |---------------|------|
//! | `"webhook"` | [`WebhookSink`]: `POST {"content": ...}` (Discord-compatible) |
//! | `"log"` | [`LogSink`]: emits the notification as a log event |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AlertConfig;
use crate::http::send_with_retry;

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> Result<()>;
}

/// Posts notifications to a chat webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, config: &AlertConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let body = serde_json::json!({ "content": message });
        send_with_retry("Alert webhook", self.max_retries, || {
            self.client.post(&self.url).json(&body)
        })
        .await
        .context("webhook delivery")?;
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &str) -> Result<()> {
        info!(target: "rag_sentinel::alert", notification = %message, "alert");
        Ok(())
    }
}

/// Create the sink named by `alerts.sink`.
pub fn create_sink(config: &AlertConfig) -> Result<Arc<dyn AlertSink>> {
    match config.sink.as_str() {
        "webhook" => {
            let url = config
                .webhook_url()
                .ok_or_else(|| anyhow::anyhow!("alerts.webhook_url is not set"))?;
            Ok(Arc::new(WebhookSink::new(url, config)?))
        }
        "log" => Ok(Arc::new(LogSink)),
        other => bail!("Unknown alert sink: {}", other),
    }
}
