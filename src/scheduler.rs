// src/scheduler.rs
//! Daily time-of-day triggers feeding a group controller.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Days, FixedOffset, NaiveTime, Utc};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::controller::GroupController;

/// A scheduler firing, stamped with its nominal time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub at: DateTime<Utc>,
}

/// Parse "HH:MM" (or "HH:MM:SS").
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let t = s.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .map_err(|_| anyhow!("invalid time of day {t:?}, expected HH:MM"))
}

/// Earliest instant strictly after `now` whose local time (in `offset`) is one
/// of `times`. `None` only when `times` is empty.
pub fn next_trigger(
    now: DateTime<Utc>,
    times: &[NaiveTime],
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let local_today = now.with_timezone(&offset).date_naive();
    let mut best: Option<DateTime<Utc>> = None;
    for day in [local_today, local_today + Days::new(1)] {
        for t in times {
            let Some(local) = day.and_time(*t).and_local_timezone(offset).single() else {
                continue;
            };
            let at = local.with_timezone(&Utc);
            if at > now && best.map_or(true, |b| at < b) {
                best = Some(at);
            }
        }
    }
    best
}

/// Spawn the trigger task and the controller task for one group.
///
/// The trigger task only computes times and sends; all window state stays in
/// the controller task.
pub fn spawn_group(
    controller: GroupController,
    times: Vec<NaiveTime>,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Trigger>(8);
    let group = controller.name().to_string();

    let trigger_task = tokio::spawn(async move {
        loop {
            let Some(at) = next_trigger(clock.now(), &times, offset) else {
                tracing::warn!(target: "scheduler", %group, "empty schedule, trigger task exiting");
                return;
            };
            tracing::info!(target: "scheduler", %group, next = %at, "next window scheduled");
            clock.sleep_until(at).await;
            counter!("relay_triggers_total").increment(1);
            if tx.send(Trigger { at }).await.is_err() {
                tracing::debug!(target: "scheduler", %group, "controller gone, trigger task exiting");
                return;
            }
        }
    });

    let controller_task = tokio::spawn(controller.run(rx));
    (trigger_task, controller_task)
}
