//! HTTP delivery of notification intents.

use anyhow::Context;
use async_trait::async_trait;
use stagegate_core::{NotificationIntent, Notifier, PipelineError};
use std::time::Duration;

/// POSTs each intent as JSON to a fixed URL.
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("stagegate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            url: url.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, intent: &NotificationIntent) -> stagegate_core::Result<()> {
        self.http_client
            .post(&self.url)
            .json(intent)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| PipelineError::Notification(format!("POST {}: {}", self.url, e)))?;
        Ok(())
    }
}
