use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::Notifier;

/// Posts `{"text": ...}` to a chat incoming-webhook URL (Google Chat, Slack).
pub struct ChatWebhookNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl ChatWebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for ChatWebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let body = serde_json::json!({ "text": text });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("chat webhook post")?
            .error_for_status()
            .context("chat webhook non-2xx")?;
        Ok(())
    }
}
