// tests/config_load.rs
use relay_monitor::config::{self, from_env, load_default, load_from, ENV_RELAY_CONFIG_PATH};
use relay_monitor::{OverlapPolicy, RetryPolicy};
use std::{env, fs};

const TOML: &str = r#"
utc_offset_minutes = -420

[[groups]]
name = "posts"
sources = ["r/solar", "r/SolarDIY"]
keywords = ["quote", "installer"]
webhook_url = "https://hooks.example.com/posts"
schedule = ["09:00", "13:00", "20:00"]
poll_interval_secs = 300
run_duration_secs = 3600

[[groups]]
name = "inbox"
sources = ["me/comments", "inbox"]
webhook_url = "https://hooks.example.com/inbox"
schedule = ["09:00", "13:00", "20:00"]
fetch_limit = 100
overlap = "restart"
retry = { mode = "backoff", max_attempts = 3, base_delay_ms = 500 }

[receiver]
trigger = "@NotifiQA"
notify_url = "https://chat.example.com/v1/spaces/X/messages"
"#;

const RELAY_VARS: &[&str] = &[
    ENV_RELAY_CONFIG_PATH,
    "RELAY_SOURCES",
    "RELAY_KEYWORDS",
    "RELAY_WEBHOOK_URL",
    "RELAY_SCHEDULE",
    "RELAY_OVERLAP",
    "RELAY_POLL_INTERVAL_SECS",
    "RELAY_RUN_DURATION_SECS",
    "RELAY_UTC_OFFSET_MINUTES",
    "RECEIVER_TRIGGER",
    "RECEIVER_NOTIFY_URL",
];

fn clear_env() {
    for v in RELAY_VARS {
        env::remove_var(v);
    }
}

#[test]
fn toml_file_loads_groups_and_receiver() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("relay.toml");
    fs::write(&p, TOML).unwrap();

    let cfg = load_from(&p).unwrap();
    assert_eq!(cfg.groups.len(), 2);
    assert_eq!(cfg.utc_offset().unwrap().local_minus_utc(), -7 * 3600);

    let inbox = &cfg.groups[1];
    assert_eq!(inbox.fetch_limit, 100);
    assert_eq!(inbox.overlap, OverlapPolicy::Restart);
    assert_eq!(
        inbox.retry,
        RetryPolicy::Backoff {
            max_attempts: 3,
            base_delay_ms: 500
        }
    );

    let rc = cfg.receiver.expect("receiver");
    assert_eq!(rc.trigger, "@NotifiQA");
    assert_eq!(rc.notice, "A new deploy was requested!");
}

#[test]
fn json_file_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("relay.json");
    fs::write(
        &p,
        r#"{"groups":[{"name":"posts","sources":["r/solar"],"webhook_url":"https://h.example.com",
            "schedule":["09:00"]}]}"#,
    )
    .unwrap();

    let cfg = load_from(&p).unwrap();
    assert_eq!(cfg.groups[0].poll_interval_secs, 300);
    assert!(cfg.receiver.is_none());
}

#[test]
fn group_without_sources_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("relay.toml");
    fs::write(
        &p,
        r#"
[[groups]]
name = "posts"
sources = ["  "]
webhook_url = "https://h.example.com"
schedule = ["09:00"]
"#,
    )
    .unwrap();
    let err = load_from(&p).unwrap_err();
    assert!(err.to_string().contains("no sources"), "got {err}");
}

#[serial_test::serial]
#[test]
fn default_uses_env_path_then_file_then_env_vars() {
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing configured -> error.
    assert!(load_default().is_err());

    // 2) Env-only single group.
    env::set_var("RELAY_SOURCES", "r/solar, inbox,,r/solar");
    env::set_var("RELAY_KEYWORDS", "quote,Installer");
    env::set_var("RELAY_WEBHOOK_URL", "https://hooks.example.com/x");
    env::set_var("RELAY_SCHEDULE", "09:00,20:00");
    env::set_var("RELAY_OVERLAP", "restart");
    let cfg = load_default().unwrap();
    assert_eq!(cfg.groups.len(), 1);
    assert_eq!(cfg.groups[0].name, "default");
    assert_eq!(cfg.groups[0].sources, vec!["r/solar".to_string(), "inbox".to_string()]);
    assert_eq!(cfg.groups[0].overlap, OverlapPolicy::Restart);

    // 3) config/relay.toml wins over env vars.
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(tmp.path().join(config::DEFAULT_RELAY_CONFIG_PATH), TOML).unwrap();
    assert_eq!(load_default().unwrap().groups.len(), 2);

    // 4) Explicit path wins over everything; a missing one is an error.
    env::set_var(ENV_RELAY_CONFIG_PATH, tmp.path().join("nope.toml"));
    assert!(load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_fallback_rejects_bad_overlap_policy() {
    clear_env();
    env::set_var("RELAY_SOURCES", "r/solar");
    env::set_var("RELAY_WEBHOOK_URL", "https://hooks.example.com/x");
    env::set_var("RELAY_SCHEDULE", "09:00");
    env::set_var("RELAY_OVERLAP", "replace");
    assert!(from_env().is_err());
    clear_env();
}

#[serial_test::serial]
#[test]
fn env_fallback_rejects_unparsable_durations() {
    clear_env();
    env::set_var("RELAY_SOURCES", "r/solar");
    env::set_var("RELAY_WEBHOOK_URL", "https://hooks.example.com/x");
    env::set_var("RELAY_SCHEDULE", "09:00");

    env::set_var("RELAY_POLL_INTERVAL_SECS", "5m");
    let err = from_env().unwrap_err();
    assert!(err.to_string().contains("RELAY_POLL_INTERVAL_SECS"), "got {err}");

    env::set_var("RELAY_POLL_INTERVAL_SECS", " 120 ");
    env::set_var("RELAY_RUN_DURATION_SECS", "-1");
    let err = from_env().unwrap_err();
    assert!(err.to_string().contains("RELAY_RUN_DURATION_SECS"), "got {err}");

    env::set_var("RELAY_RUN_DURATION_SECS", "");
    let cfg = from_env().unwrap();
    assert_eq!(cfg.groups[0].poll_interval_secs, 120);
    assert_eq!(cfg.groups[0].run_duration_secs, 3600);
    clear_env();
}

#[test]
fn oversized_run_duration_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("relay.toml");
    fs::write(
        &p,
        r#"
[[groups]]
name = "posts"
sources = ["r/solar"]
webhook_url = "https://h.example.com"
schedule = ["09:00"]
run_duration_secs = 1000000000000000
"#,
    )
    .unwrap();
    let err = load_from(&p).unwrap_err();
    assert!(err.to_string().contains("run_duration_secs"), "got {err}");
}
