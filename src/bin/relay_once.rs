//! Runs a single fetch-filter-relay cycle for every configured group (or the
//! one named on the command line) and exits. Useful to check credentials,
//! sources and the destination webhook without waiting for the schedule.

use std::sync::Arc;

use anyhow::{bail, Context};
use relay_monitor::app::build_reddit_groups;
use relay_monitor::clock::{Clock, SystemClock};
use relay_monitor::config::{self, reddit::RedditCredentials};
use relay_monitor::ingest::RedditClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let only = std::env::args().nth(1);
    let cfg = config::load_default().context("loading relay config")?;
    if let Some(name) = &only {
        if !cfg.groups.iter().any(|g| &g.name == name) {
            bail!("no source group named {name:?}");
        }
    }

    let reddit = RedditClient::connect(RedditCredentials::from_env()?).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    for mut g in build_reddit_groups(&cfg, &reddit, clock)? {
        if only.as_deref().is_some_and(|n| n != g.controller.name()) {
            continue;
        }
        g.controller.open_window();
        let report = g.controller.run_cycle().await;
        g.controller.close_window();
        println!("{}: {:?}", g.controller.name(), report);
    }

    println!("relay-once done");
    Ok(())
}
