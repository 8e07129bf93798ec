// src/notify/mod.rs
pub mod chat;

use anyhow::Result;

pub use chat::ChatWebhookNotifier;

/// One-shot outbound notification.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}
