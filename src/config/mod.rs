// src/config/mod.rs
//! Runtime configuration: source groups, schedule, relay destinations,
//! and the inbound receiver.

pub mod reddit;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration as ChronoDuration, FixedOffset, NaiveTime};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::controller::OverlapPolicy;
use crate::relay::RetryPolicy;
use crate::scheduler::parse_time_of_day;

pub const ENV_RELAY_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_RELAY_CONFIG_PATH: &str = "config/relay.toml";

/// Upper bound for `poll_interval_secs` and `run_duration_secs` (one week).
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;

fn default_poll_interval_secs() -> u64 {
    300
}
fn default_run_duration_secs() -> u64 {
    3600
}
fn default_fetch_limit() -> u32 {
    25
}
fn default_relay_timeout_secs() -> u64 {
    10
}
fn default_notify_timeout_secs() -> u64 {
    5
}
fn default_notice() -> String {
    "A new deploy was requested!".to_string()
}
fn default_ack() -> String {
    "Notifying the QA team...".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Offset applied to the `HH:MM` schedule times. Fixed, no DST.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub receiver: Option<ReceiverConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub webhook_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_run_duration_secs")]
    pub run_duration_secs: u64,
    /// Times of day, "HH:MM".
    pub schedule: Vec<String>,
    #[serde(default)]
    pub overlap: OverlapPolicy,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    /// Substring that fires the notification.
    pub trigger: String,
    pub notify_url: String,
    #[serde(default = "default_notice")]
    pub notice: String,
    #[serde(default = "default_ack")]
    pub ack: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

impl RelayConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("utc_offset_minutes out of range: {}", self.utc_offset_minutes))
    }

    /// Trim lists, drop blanks and duplicates, and reject unusable groups.
    pub fn validate(mut self) -> Result<Self> {
        self.utc_offset()?;
        if self.groups.is_empty() {
            bail!("relay config has no source groups");
        }
        let mut names = HashSet::new();
        for g in &mut self.groups {
            g.name = g.name.trim().to_string();
            if g.name.is_empty() {
                bail!("source group with empty name");
            }
            if !names.insert(g.name.clone()) {
                bail!("duplicate source group name: {}", g.name);
            }
            g.sources = clean_list(std::mem::take(&mut g.sources));
            g.keywords = clean_list(std::mem::take(&mut g.keywords));
            g.schedule = clean_list(std::mem::take(&mut g.schedule));
            if g.sources.is_empty() {
                bail!("group {}: no sources", g.name);
            }
            if g.schedule.is_empty() {
                bail!("group {}: empty schedule", g.name);
            }
            g.schedule_times()?;
            if g.webhook_url.trim().is_empty() {
                bail!("group {}: missing webhook_url", g.name);
            }
            if g.poll_interval_secs == 0 {
                bail!("group {}: poll_interval_secs must be > 0", g.name);
            }
            g.poll_interval()?;
            g.run_duration()?;
        }
        if let Some(r) = &self.receiver {
            if r.trigger.trim().is_empty() {
                bail!("receiver trigger must not be empty");
            }
        }
        Ok(self)
    }
}

impl GroupConfig {
    pub fn schedule_times(&self) -> Result<Vec<NaiveTime>> {
        self.schedule
            .iter()
            .map(|s| parse_time_of_day(s).with_context(|| format!("group {}", self.name)))
            .collect()
    }

    pub fn poll_interval(&self) -> Result<ChronoDuration> {
        bounded_secs(&self.name, "poll_interval_secs", self.poll_interval_secs)
    }

    pub fn run_duration(&self) -> Result<ChronoDuration> {
        bounded_secs(&self.name, "run_duration_secs", self.run_duration_secs)
    }
}

fn bounded_secs(group: &str, field: &str, secs: u64) -> Result<ChronoDuration> {
    if secs > MAX_WINDOW_SECS {
        bail!("group {group}: {field} = {secs} exceeds {MAX_WINDOW_SECS}");
    }
    ChronoDuration::try_seconds(secs as i64)
        .ok_or_else(|| anyhow!("group {group}: {field} out of range"))
}

/// Load from an explicit path. Supports TOML or JSON.
pub fn load_from(path: &Path) -> Result<RelayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading relay config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg: RelayConfig = if ext == "json" {
        serde_json::from_str(&content).context("parsing relay config json")?
    } else {
        toml::from_str(&content).context("parsing relay config toml")?
    };
    cfg.validate()
}

/// Load using env var + fallbacks:
/// 1) $RELAY_CONFIG_PATH
/// 2) config/relay.toml
/// 3) a single group from RELAY_* environment variables
pub fn load_default() -> Result<RelayConfig> {
    if let Ok(p) = std::env::var(ENV_RELAY_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_RELAY_CONFIG_PATH} points to non-existent path");
        }
        return load_from(&pb);
    }
    let default_p = PathBuf::from(DEFAULT_RELAY_CONFIG_PATH);
    if default_p.exists() {
        return load_from(&default_p);
    }
    from_env()
}

/// Single-group configuration from the environment.
pub fn from_env() -> Result<RelayConfig> {
    let sources = env_list("RELAY_SOURCES");
    if sources.is_empty() {
        bail!("no relay configuration found (set {ENV_RELAY_CONFIG_PATH} or RELAY_SOURCES)");
    }
    let webhook_url =
        std::env::var("RELAY_WEBHOOK_URL").map_err(|_| anyhow!("RELAY_WEBHOOK_URL missing"))?;
    let overlap = match std::env::var("RELAY_OVERLAP") {
        Ok(v) => v.parse()?,
        Err(_) => OverlapPolicy::default(),
    };

    let group = GroupConfig {
        name: std::env::var("RELAY_GROUP_NAME").unwrap_or_else(|_| "default".to_string()),
        sources,
        keywords: env_list("RELAY_KEYWORDS"),
        webhook_url,
        poll_interval_secs: env_num("RELAY_POLL_INTERVAL_SECS")?
            .unwrap_or(default_poll_interval_secs()),
        run_duration_secs: env_num("RELAY_RUN_DURATION_SECS")?
            .unwrap_or(default_run_duration_secs()),
        schedule: env_list("RELAY_SCHEDULE"),
        overlap,
        fetch_limit: env_num("RELAY_FETCH_LIMIT")?.unwrap_or(default_fetch_limit()),
        relay_timeout_secs: default_relay_timeout_secs(),
        retry: RetryPolicy::Never,
    };

    let receiver = match (
        std::env::var("RECEIVER_TRIGGER").ok(),
        std::env::var("RECEIVER_NOTIFY_URL").ok(),
    ) {
        (Some(trigger), Some(notify_url)) => Some(ReceiverConfig {
            trigger,
            notify_url,
            notice: std::env::var("RECEIVER_NOTICE").unwrap_or_else(|_| default_notice()),
            ack: default_ack(),
            notify_timeout_secs: default_notify_timeout_secs(),
        }),
        _ => None,
    };

    RelayConfig {
        utc_offset_minutes: env_num("RELAY_UTC_OFFSET_MINUTES")?.unwrap_or(0),
        groups: vec![group],
        receiver,
    }
    .validate()
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| clean_list(v.split(',').map(str::to_string).collect()))
        .unwrap_or_default()
}

/// Unset or blank is `None`; anything else must parse.
fn env_num<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let v = raw.trim();
    if v.is_empty() {
        return Ok(None);
    }
    v.parse()
        .map(Some)
        .map_err(|e| anyhow!("{key}={v:?} is not a valid number: {e}"))
}

/// Trim, drop blanks, drop duplicates. Keeps first-seen order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
utc_offset_minutes = -420

[[groups]]
name = "posts"
sources = ["r/solar", " r/SolarDIY ", "", "r/solar"]
keywords = ["quote", "  ", "installer"]
webhook_url = "https://hooks.example.com/posts"
schedule = ["09:00", "13:00", "20:00"]

[[groups]]
name = "inbox"
sources = ["me/comments", "inbox"]
webhook_url = "https://hooks.example.com/inbox"
schedule = ["09:00"]
overlap = "restart"
retry = { mode = "backoff", max_attempts = 3, base_delay_ms = 500 }
"#;

    #[test]
    fn clean_list_keeps_order_and_drops_blanks() {
        let out = clean_list(vec![" b ".into(), "".into(), "a".into(), "b".into()]);
        assert_eq!(out, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn sample_toml_parses_with_defaults() {
        let cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        let cfg = cfg.validate().unwrap();
        assert_eq!(cfg.utc_offset().unwrap().local_minus_utc(), -420 * 60);

        let posts = &cfg.groups[0];
        assert_eq!(posts.sources, vec!["r/solar".to_string(), "r/SolarDIY".to_string()]);
        assert_eq!(posts.keywords, vec!["quote".to_string(), "installer".to_string()]);
        assert_eq!(posts.poll_interval_secs, 300);
        assert_eq!(posts.run_duration_secs, 3600);
        assert_eq!(posts.overlap, OverlapPolicy::Ignore);
        assert_eq!(posts.retry, RetryPolicy::Never);
        assert_eq!(posts.schedule_times().unwrap().len(), 3);

        let inbox = &cfg.groups[1];
        assert!(inbox.keywords.is_empty());
        assert_eq!(inbox.overlap, OverlapPolicy::Restart);
        assert_eq!(
            inbox.retry,
            RetryPolicy::Backoff { max_attempts: 3, base_delay_ms: 500 }
        );
    }

    #[test]
    fn rejects_bad_schedule_and_zero_interval() {
        let mut cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        cfg.groups[0].schedule = vec!["25:00".into()];
        assert!(cfg.validate().is_err());

        let mut cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        cfg.groups[1].poll_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_window_durations_beyond_a_week() {
        let mut cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        cfg.groups[0].run_duration_secs = 1_000_000_000_000_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("run_duration_secs"), "got {err}");

        let mut cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        cfg.groups[1].poll_interval_secs = u64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        cfg.groups[0].run_duration_secs = MAX_WINDOW_SECS;
        let cfg = cfg.validate().unwrap();
        assert_eq!(
            cfg.groups[0].run_duration().unwrap(),
            ChronoDuration::days(7)
        );
    }

    #[test]
    fn rejects_duplicate_group_names() {
        let mut cfg: RelayConfig = toml::from_str(SAMPLE).unwrap();
        cfg.groups[1].name = "posts".into();
        assert!(cfg.validate().is_err());
    }
}
