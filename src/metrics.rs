use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metric descriptions. Only effective once a recorder is installed.
fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_items_fetched_total", "Candidate items returned by sources.");
        describe_counter!(
            "relay_items_accepted_total",
            "Items that passed dedup, time window and relevance."
        );
        describe_counter!("relay_fetch_errors_total", "Source fetch failures.");
        describe_counter!(
            "relay_delivery_failures_total",
            "Relay batches that failed after all attempts."
        );
        describe_counter!("relay_windows_total", "Run windows opened.");
        describe_counter!("relay_triggers_total", "Scheduler triggers fired.");
        describe_counter!("receiver_notifications_total", "Notifications fired by the receiver.");
        describe_gauge!("relay_watermark_ts", "Unix ts of the last committed watermark.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Fails if a recorder is already set.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
