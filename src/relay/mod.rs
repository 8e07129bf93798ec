// src/relay/mod.rs
pub mod webhook;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::{CandidateItem, ItemPayload};

pub use webhook::WebhookRelay;

/// Text to post back on the origin item, as returned by the relay destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyInstruction {
    pub id: String,
    #[serde(alias = "text")]
    pub reply: String,
}

/// Retry behaviour for a relay POST. Deployments pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryPolicy {
    #[default]
    Never,
    Backoff {
        max_attempts: u8,
        base_delay_ms: u64,
    },
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u8 {
        match self {
            RetryPolicy::Never => 1,
            RetryPolicy::Backoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u8) -> std::time::Duration {
        match self {
            RetryPolicy::Never => std::time::Duration::ZERO,
            RetryPolicy::Backoff { base_delay_ms, .. } => {
                let shift = u32::from(attempt.saturating_sub(1)).min(16);
                std::time::Duration::from_millis(base_delay_ms.saturating_mul(1u64 << shift))
            }
        }
    }
}

/// Delivers accepted items to a destination.
#[async_trait::async_trait]
pub trait Relay: Send + Sync {
    /// Must not perform any I/O when `items` is empty.
    async fn relay(&self, items: &[CandidateItem]) -> Result<Vec<ReplyInstruction>>;
}

/// Wire shape of one relayed item: `{type, id, source, created, ...payload}`.
#[derive(Debug, Serialize)]
pub struct WireItem<'a> {
    pub id: &'a str,
    pub source: &'a str,
    pub created: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: &'a ItemPayload,
}

impl<'a> From<&'a CandidateItem> for WireItem<'a> {
    fn from(it: &'a CandidateItem) -> Self {
        Self {
            id: &it.id,
            source: &it.source,
            created: it.created_at,
            payload: &it.payload,
        }
    }
}

pub fn to_wire(items: &[CandidateItem]) -> Vec<WireItem<'_>> {
    items.iter().map(WireItem::from).collect()
}

// --- tolerant variants of the destination response ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayResponseAny {
    Batch { replies: Vec<ReplyInstruction> },
    Single(ReplyInstruction),
}

/// Parse reply instructions from a response body. Empty or unrecognized
/// bodies mean "no feedback".
pub fn parse_replies(body: &str) -> Vec<ReplyInstruction> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Vec::new();
    }
    match serde_json::from_str::<RelayResponseAny>(trimmed) {
        Ok(RelayResponseAny::Batch { replies }) => replies
            .into_iter()
            .filter(|r| !r.reply.trim().is_empty())
            .collect(),
        Ok(RelayResponseAny::Single(r)) if !r.reply.trim().is_empty() => vec![r],
        Ok(RelayResponseAny::Single(_)) => Vec::new(),
        Err(_) => {
            tracing::debug!(target: "relay", "response carries no reply instructions");
            Vec::new()
        }
    }
}
