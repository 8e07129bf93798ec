// src/controller.rs
//! Run-window controller: one per source group.
//!
//! Owns the group's watermark and the current window's seen set. A window
//! opens on a scheduler trigger, runs fetch-filter-relay cycles every poll
//! interval until its deadline, then closes and commits the watermark.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::admission::{admit, SeenSet};
use crate::clock::Clock;
use crate::config::GroupConfig;
use crate::ingest::types::{CandidateItem, SourceProvider};
use crate::relay::{Relay, ReplyInstruction};
use crate::relevance::{is_relevant, matched_keywords};
use crate::scheduler::Trigger;

/// What to do when a trigger fires while a window is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Log and drop the trigger.
    #[default]
    Ignore,
    /// Close the running window (committing its watermark) and open a new one.
    Restart,
}

impl FromStr for OverlapPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(OverlapPolicy::Ignore),
            "restart" => Ok(OverlapPolicy::Restart),
            other => bail!("unknown overlap policy {other:?} (expected ignore|restart)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupSettings {
    pub sources: Vec<String>,
    pub keywords: Vec<String>,
    pub poll_interval: ChronoDuration,
    pub run_duration: ChronoDuration,
    pub overlap: OverlapPolicy,
}

impl GroupSettings {
    pub fn from_config(cfg: &GroupConfig) -> Result<Self> {
        Ok(Self {
            sources: cfg.sources.clone(),
            keywords: cfg.keywords.clone(),
            poll_interval: cfg.poll_interval()?,
            run_duration: cfg.run_duration()?,
            overlap: cfg.overlap,
        })
    }
}

/// One activation of the scheduler.
#[derive(Debug)]
pub struct RunWindow {
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    seen: SeenSet,
}

impl RunWindow {
    fn open(now: DateTime<Utc>, run_duration: ChronoDuration) -> Self {
        Self {
            started_at: now,
            deadline: now + run_duration,
            seen: SeenSet::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }
}

#[derive(Debug)]
pub enum WindowState {
    Idle,
    Running(RunWindow),
}

/// Outcome of one fetch-filter-relay cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub accepted: usize,
    pub fetch_errors: usize,
    /// Deadline hit mid-cycle; remaining sources/items skipped.
    pub aborted: bool,
    pub relay_failed: bool,
    pub replies_forwarded: usize,
}

pub struct GroupController {
    name: String,
    settings: GroupSettings,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn SourceProvider>,
    relay: Arc<dyn Relay>,
    state: WindowState,
    watermark: Option<DateTime<Utc>>,
    /// Triggers stamped after the running window's deadline.
    deferred: VecDeque<Trigger>,
}

impl GroupController {
    pub fn new(
        name: impl Into<String>,
        settings: GroupSettings,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn SourceProvider>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            clock,
            provider,
            relay,
            state: WindowState::Idle,
            watermark: None,
            deferred: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, WindowState::Running(_))
    }

    /// Handle a scheduler firing. Returns true if a new window was opened.
    pub fn on_trigger(&mut self, trigger: Trigger) -> bool {
        // A window past its deadline is not running any more; only its close
        // was still pending.
        let now = self.clock.now();
        if matches!(&self.state, WindowState::Running(w) if w.is_expired(now)) {
            self.close_window();
        }
        if self.is_running() {
            match self.settings.overlap {
                OverlapPolicy::Ignore => {
                    tracing::warn!(
                        target: "controller",
                        group = %self.name,
                        at = %trigger.at,
                        "trigger fired while window running, ignored"
                    );
                    return false;
                }
                OverlapPolicy::Restart => {
                    tracing::warn!(
                        target: "controller",
                        group = %self.name,
                        at = %trigger.at,
                        "trigger fired while window running, restarting window"
                    );
                    self.close_window();
                }
            }
        }
        self.open_window();
        true
    }

    /// Idle -> Running. A running window is left untouched.
    pub fn open_window(&mut self) {
        if self.is_running() {
            return;
        }
        let window = RunWindow::open(self.clock.now(), self.settings.run_duration);
        tracing::info!(
            target: "controller",
            group = %self.name,
            started_at = %window.started_at,
            deadline = %window.deadline,
            "run window opened"
        );
        counter!("relay_windows_total").increment(1);
        self.state = WindowState::Running(window);
    }

    /// Running -> Idle. Commits the watermark to the window's start time.
    pub fn close_window(&mut self) {
        let WindowState::Running(window) = std::mem::replace(&mut self.state, WindowState::Idle)
        else {
            return;
        };
        let committed = match self.watermark {
            Some(w) if w > window.started_at => w,
            _ => window.started_at,
        };
        self.watermark = Some(committed);
        gauge!("relay_watermark_ts").set(committed.timestamp() as f64);
        tracing::info!(
            target: "controller",
            group = %self.name,
            accepted = window.seen.len(),
            watermark = %committed,
            "run window closed"
        );
    }

    /// One pass over all sources. No-op when idle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let WindowState::Running(window) = &mut self.state else {
            tracing::debug!(target: "controller", group = %self.name, "cycle requested while idle");
            return report;
        };

        let now = self.clock.now();
        let mut accepted: Vec<CandidateItem> = Vec::new();

        'sources: for source in &self.settings.sources {
            if window.is_expired(self.clock.now()) {
                tracing::info!(target: "controller", group = %self.name, %source, "deadline reached, skipping remaining sources");
                report.aborted = true;
                break;
            }

            let items = match self.provider.fetch_latest(source).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        target: "controller",
                        group = %self.name,
                        %source,
                        provider = self.provider.name(),
                        error = ?e,
                        "source fetch failed"
                    );
                    counter!("relay_fetch_errors_total").increment(1);
                    report.fetch_errors += 1;
                    continue;
                }
            };
            report.fetched += items.len();
            counter!("relay_items_fetched_total").increment(items.len() as u64);

            for item in items {
                if window.is_expired(self.clock.now()) {
                    tracing::info!(target: "controller", group = %self.name, %source, "deadline reached mid-source");
                    report.aborted = true;
                    break 'sources;
                }
                if !window.seen.should_process(&item.id) {
                    tracing::trace!(target: "controller", item = %item.id, "already processed in this window");
                    continue;
                }
                if !admit(&item, self.watermark, now) {
                    tracing::trace!(target: "controller", item = %item.id, created = %item.created_at, "outside time window");
                    continue;
                }
                if !is_relevant(&item, &self.settings.keywords) {
                    tracing::trace!(target: "controller", item = %item.id, "no keyword match");
                    continue;
                }

                window.seen.insert(&item.id);
                tracing::info!(
                    target: "controller",
                    group = %self.name,
                    %source,
                    item = %item.id,
                    kind = item.payload.kind(),
                    matched = ?matched_keywords(&item, &self.settings.keywords),
                    headline = %item.payload.headline(),
                    "item accepted"
                );
                if let Err(e) = self.provider.acknowledge(&item).await {
                    tracing::warn!(target: "controller", item = %item.id, error = ?e, "acknowledge failed");
                }
                accepted.push(item);
            }
        }

        report.accepted = accepted.len();
        counter!("relay_items_accepted_total").increment(accepted.len() as u64);

        if accepted.is_empty() {
            tracing::debug!(target: "controller", group = %self.name, "no new items this cycle");
            return report;
        }

        match self.relay.relay(&accepted).await {
            Ok(replies) => {
                report.replies_forwarded = self.forward_replies(&accepted, replies).await;
            }
            Err(e) => {
                tracing::warn!(
                    target: "controller",
                    group = %self.name,
                    items = accepted.len(),
                    error = ?e,
                    "relay delivery failed; items will not be retried"
                );
                counter!("relay_delivery_failures_total").increment(1);
                report.relay_failed = true;
            }
        }
        report
    }

    async fn forward_replies(&self, batch: &[CandidateItem], replies: Vec<ReplyInstruction>) -> usize {
        let mut forwarded = 0;
        for r in replies {
            let Some(item) = batch.iter().find(|it| it.id == r.id) else {
                tracing::warn!(target: "controller", group = %self.name, item = %r.id, "reply for unknown item, skipped");
                continue;
            };
            match self.provider.post_reply(item, &r.reply).await {
                Ok(()) => {
                    forwarded += 1;
                    tracing::info!(target: "controller", group = %self.name, item = %item.id, "reply posted");
                }
                Err(e) => {
                    tracing::warn!(target: "controller", group = %self.name, item = %item.id, error = ?e, "reply forward failed");
                }
            }
        }
        forwarded
    }

    /// Run cycles until the window's deadline passes, then close it.
    ///
    /// Triggers arriving meanwhile are handled between cycles per the overlap
    /// policy; those stamped after the deadline are deferred to `run`. When the next cycle would start past the deadline the task
    /// wakes at the deadline instead and closes the window there. Returns
    /// immediately when idle.
    pub async fn drive_window(&mut self, triggers: &mut mpsc::Receiver<Trigger>) {
        loop {
            let WindowState::Running(window) = &self.state else {
                return;
            };
            let deadline = window.deadline;
            let now = self.clock.now();
            if window.is_expired(now) {
                self.close_window();
                return;
            }

            let report = self.run_cycle().await;
            tracing::info!(
                target: "controller",
                group = %self.name,
                fetched = report.fetched,
                accepted = report.accepted,
                fetch_errors = report.fetch_errors,
                aborted = report.aborted,
                "cycle finished"
            );

            let next = now + self.settings.poll_interval;
            if next > deadline {
                self.clock.sleep_until(deadline).await;
                self.drain_triggers(triggers);
                // Unless a restart replaced it, this window is done.
                if self.current_deadline() == Some(deadline) {
                    self.close_window();
                }
            } else {
                self.clock.sleep_until(next).await;
                self.drain_triggers(triggers);
            }
        }
    }

    fn drain_triggers(&mut self, triggers: &mut mpsc::Receiver<Trigger>) {
        while let Ok(t) = triggers.try_recv() {
            match self.current_deadline() {
                Some(deadline) if t.at > deadline => self.deferred.push_back(t),
                _ => {
                    self.on_trigger(t);
                }
            }
        }
    }

    fn current_deadline(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            WindowState::Running(w) => Some(w.deadline),
            WindowState::Idle => None,
        }
    }

    /// Controller task body: wait for triggers, drive each window.
    pub async fn run(mut self, mut triggers: mpsc::Receiver<Trigger>) {
        loop {
            let t = match self.deferred.pop_front() {
                Some(t) => t,
                None => match triggers.recv().await {
                    Some(t) => t,
                    None => break,
                },
            };
            // Deferred triggers open their window at their own time.
            self.clock.sleep_until(t.at).await;
            if self.on_trigger(t) {
                self.drive_window(&mut triggers).await;
            }
        }
        tracing::info!(target: "controller", group = %self.name, "trigger channel closed, controller stopping");
    }
}
