// src/app.rs
//! Wiring shared by the service entrypoint and the one-shot binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use chrono::NaiveTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::clock::Clock;
use crate::config::{GroupConfig, ReceiverConfig, RelayConfig};
use crate::controller::{GroupController, GroupSettings};
use crate::ingest::{RedditClient, RedditSource, SourceProvider};
use crate::notify::ChatWebhookNotifier;
use crate::receiver::{self, ReceiverState};
use crate::relay::{Relay, WebhookRelay};

/// A ready-to-spawn group: its controller and its daily trigger times.
pub struct GroupRuntime {
    pub controller: GroupController,
    pub schedule: Vec<NaiveTime>,
}

/// Install a tracing subscriber. `RELAY_LOG_FORMAT=json` switches to JSON
/// lines. No-op if a subscriber is already installed (e.g. by the runtime).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relay_monitor=info,controller=info,relay=info,warn"));
    let json = std::env::var("RELAY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Fail fast on source identifiers the Reddit provider cannot serve.
pub fn validate_sources(group: &GroupConfig) -> Result<()> {
    for s in &group.sources {
        s.parse::<RedditSource>()
            .with_context(|| format!("group {}", group.name))?;
    }
    Ok(())
}

pub fn build_group(
    group: &GroupConfig,
    provider: Arc<dyn SourceProvider>,
    relay: Arc<dyn Relay>,
    clock: Arc<dyn Clock>,
) -> Result<GroupRuntime> {
    let schedule = group.schedule_times()?;
    let controller = GroupController::new(
        group.name.clone(),
        GroupSettings::from_config(group)?,
        clock,
        provider,
        relay,
    );
    Ok(GroupRuntime {
        controller,
        schedule,
    })
}

/// One runtime per configured group, all sharing one Reddit session.
pub fn build_reddit_groups(
    cfg: &RelayConfig,
    reddit: &RedditClient,
    clock: Arc<dyn Clock>,
) -> Result<Vec<GroupRuntime>> {
    cfg.groups
        .iter()
        .map(|g| {
            validate_sources(g)?;
            let provider: Arc<dyn SourceProvider> = Arc::new(reddit.with_limit(g.fetch_limit));
            let relay: Arc<dyn Relay> = Arc::new(
                WebhookRelay::new(g.webhook_url.clone())
                    .with_timeout(g.relay_timeout_secs)
                    .with_retry(g.retry),
            );
            build_group(g, provider, relay, Arc::clone(&clock))
        })
        .collect()
}

/// Receiver routes when configured, otherwise only the liveness routes.
pub fn build_receiver(cfg: Option<&ReceiverConfig>) -> Router {
    match cfg {
        Some(rc) => {
            let notifier = Arc::new(
                ChatWebhookNotifier::new(rc.notify_url.clone())
                    .with_timeout(rc.notify_timeout_secs),
            );
            receiver::router(ReceiverState::new(rc, notifier))
        }
        None => Router::new()
            .route("/", get(|| async { "relay receiver is running" }))
            .route("/health", get(|| async { "OK" })),
    }
}
