use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;

use super::{parse_replies, to_wire, Relay, ReplyInstruction, RetryPolicy};
use crate::ingest::types::CandidateItem;

/// POSTs the accepted batch as a JSON array to a fixed URL.
#[derive(Clone)]
pub struct WebhookRelay {
    url: String,
    client: Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl WebhookRelay {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::Never,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl Relay for WebhookRelay {
    async fn relay(&self, items: &[CandidateItem]) -> Result<Vec<ReplyInstruction>> {
        if items.is_empty() {
            tracing::debug!(target: "relay", "nothing to relay");
            return Ok(Vec::new());
        }

        let payload = to_wire(items);
        let max_attempts = self.retry.max_attempts();

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(rsp) => {
                        let body = rsp.text().await.unwrap_or_default();
                        tracing::info!(
                            target: "relay",
                            items = items.len(),
                            attempt,
                            "batch delivered"
                        );
                        return Ok(parse_replies(&body));
                    }
                    Err(e) => anyhow!("relay webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("relay webhook request failed: {e}"),
            };

            if attempt < max_attempts {
                tracing::debug!(target: "relay", attempt, error = %err, "retrying relay");
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
                continue;
            }
            return Err(err);
        }
    }
}
