// src/receiver.rs
//! Inbound webhook receiver: watches chat messages for a trigger substring
//! and fires a one-shot notification. Stateless.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::ReceiverConfig;
use crate::notify::Notifier;

pub const NOT_RECOGNIZED: &str = "Message not recognized.";

#[derive(Clone)]
pub struct ReceiverState {
    trigger: Arc<str>,
    notice: Arc<str>,
    ack: Arc<str>,
    notifier: Arc<dyn Notifier>,
}

impl ReceiverState {
    pub fn new(cfg: &ReceiverConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            trigger: Arc::from(cfg.trigger.as_str()),
            notice: Arc::from(cfg.notice.as_str()),
            ack: Arc::from(cfg.ack.as_str()),
            notifier,
        }
    }
}

pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route("/", get(|| async { "relay receiver is running" }))
        .route("/health", get(|| async { "OK" }))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize, Default)]
struct ChatEvent {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    text: String,
}

async fn webhook(
    State(state): State<ReceiverState>,
    Json(ev): Json<ChatEvent>,
) -> (StatusCode, Json<ChatReply>) {
    let text = ev
        .message
        .and_then(|m| m.text)
        .unwrap_or_default();

    if !text.contains(&*state.trigger) {
        tracing::debug!(target: "receiver", "message without trigger");
        return (
            StatusCode::OK,
            Json(ChatReply {
                text: NOT_RECOGNIZED.to_string(),
            }),
        );
    }

    match state.notifier.send(&state.notice).await {
        Ok(()) => {
            counter!("receiver_notifications_total").increment(1);
            tracing::info!(target: "receiver", trigger = %state.trigger, "notification sent");
            (
                StatusCode::OK,
                Json(ChatReply {
                    text: state.ack.to_string(),
                }),
            )
        }
        Err(e) => {
            tracing::warn!(target: "receiver", error = ?e, "notification failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ChatReply {
                    text: "Notification failed.".to_string(),
                }),
            )
        }
    }
}
