//! relay-monitor service entrypoint
//! Authenticates with Reddit, spawns a scheduler + controller pair per source
//! group, and serves the inbound webhook receiver.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use shuttle_axum::ShuttleAxum;

use relay_monitor::app::{build_receiver, build_reddit_groups, init_tracing};
use relay_monitor::clock::{Clock, SystemClock};
use relay_monitor::config::{self, reddit::RedditCredentials};
use relay_monitor::ingest::RedditClient;
use relay_monitor::metrics::Metrics;
use relay_monitor::scheduler::spawn_group;

async fn start() -> anyhow::Result<Router> {
    let cfg = config::load_default().context("loading relay config")?;
    let offset = cfg.utc_offset()?;

    // Nothing downstream can work without a session; fail startup.
    let creds = RedditCredentials::from_env()?;
    let reddit = RedditClient::connect(creds).await?;

    // Recorder first, so metric descriptions reach the exporter.
    let metrics = Metrics::init()
        .map_err(|e| tracing::warn!(error = ?e, "metrics exporter not installed"))
        .ok();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let groups = build_reddit_groups(&cfg, &reddit, Arc::clone(&clock))?;
    for g in groups {
        tracing::info!(
            group = g.controller.name(),
            times = ?g.schedule,
            "scheduling source group"
        );
        let group = g.controller.name().to_string();
        let (_trigger_task, controller_task) =
            spawn_group(g.controller, g.schedule, offset, Arc::clone(&clock));
        tokio::spawn(async move {
            if let Err(e) = controller_task.await {
                tracing::error!(%group, error = %e, "controller task ended abnormally");
            }
        });
    }

    let mut router = build_receiver(cfg.receiver.as_ref());
    if let Some(m) = metrics {
        router = router.merge(m.router());
    }
    Ok(router)
}

#[shuttle_runtime::main]
async fn relay_monitor() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let router = start().await?;
    tracing::info!("relay monitor started");
    Ok(router.into())
}
