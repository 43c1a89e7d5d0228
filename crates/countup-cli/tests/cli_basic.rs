//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory, so no
//! test touches the user's config, database or keyring.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_countup"))
        .args(args)
        .env("COUNTUP_DATA_DIR", data_dir)
        .env("COUNTUP_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

fn add_timer(data_dir: &Path, name: &str) -> String {
    let event = run_json(data_dir, &["timer", "add", name, "--reference", "1500"]);
    assert_eq!(event["type"], "timer_added");
    event["id"].as_str().unwrap().to_string()
}

#[test]
fn test_timer_add_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let id = add_timer(dir.path(), "Focus");

    let list = run_json(dir.path(), &["timer", "list"]);
    let timers = list.as_array().unwrap();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0]["id"], id.as_str());
    assert_eq!(timers[0]["name"], "Focus");
    assert_eq!(timers[0]["reference_duration_secs"], 1500);
    assert_eq!(timers[0]["running"], false);
}

#[test]
fn test_blank_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["timer", "add", "   "]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error"));
}

#[test]
fn test_start_by_name_keeps_one_running() {
    let dir = tempfile::tempdir().unwrap();
    let a = add_timer(dir.path(), "Reading");
    let b = add_timer(dir.path(), "Writing");

    run_json(dir.path(), &["timer", "start", "Reading"]);
    let event = run_json(dir.path(), &["timer", "start", &b]);
    assert_eq!(event["type"], "timer_started");
    assert_eq!(event["paused_other"], a.as_str());

    let list = run_json(dir.path(), &["timer", "list"]);
    let running: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["running"] == true)
        .collect();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0]["id"], b.as_str());
}

#[test]
fn test_status_reports_active_timer() {
    let dir = tempfile::tempdir().unwrap();
    let id = add_timer(dir.path(), "Focus");

    let idle = run_json(dir.path(), &["timer", "status"]);
    assert!(idle["active_timer_id"].is_null());

    run_json(dir.path(), &["timer", "start", &id[..8]]);
    run_json(dir.path(), &["timer", "pause", "Focus"]);
    let status = run_json(dir.path(), &["timer", "status"]);
    assert_eq!(status["active_timer_id"], id.as_str());
    assert_eq!(status["active_timer_name"], "Focus");
    assert_eq!(status["running"], false);

    let toggled = run_json(dir.path(), &["timer", "toggle-active"]);
    assert_eq!(toggled["type"], "timer_started");
}

#[test]
fn test_reset_rename_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    let id = add_timer(dir.path(), "Focus");

    let reset = run_json(dir.path(), &["timer", "reset", &id]);
    assert_eq!(reset["type"], "timer_reset");

    let renamed = run_json(dir.path(), &["timer", "rename", &id, "Deep work"]);
    assert_eq!(renamed["name"], "Deep work");

    let duration = run_json(dir.path(), &["timer", "set-duration", &id, "600"]);
    assert_eq!(duration["reference_duration_secs"], 600);

    let removed = run_json(dir.path(), &["timer", "remove", "Deep work"]);
    assert_eq!(removed["type"], "timer_removed");
    assert!(run_json(dir.path(), &["timer", "list"])
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn test_unknown_timer_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["timer", "start", "nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("no timer matches"));
}

#[test]
fn test_watch_prints_requested_updates() {
    let dir = tempfile::tempdir().unwrap();
    add_timer(dir.path(), "Focus");
    let (stdout, _, code) = run_cli(dir.path(), &["timer", "watch", "--count", "2"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.lines().count(), 2);
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "sync.debounce_ms"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2000");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "sync.debounce_ms", "500"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(dir.path(), &["config", "get", "sync.debounce_ms"]);
    assert_eq!(stdout.trim(), "500");

    let (_, _, code) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_ne!(code, 0);
}

#[test]
fn test_toggle_active_without_timer_prints_json() {
    let dir = tempfile::tempdir().unwrap();
    let event = run_json(dir.path(), &["timer", "toggle-active"]);
    assert_eq!(event["type"], "no_active_timer");
}

#[test]
fn test_sync_needs_spreadsheet_id() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["config", "set", "sync.auth_mode", "api_key"]);
    assert_eq!(code, 0);

    let status = run_json(dir.path(), &["sync", "status"]);
    assert_eq!(status["configured"], false);
    let (_, stderr, code) = run_cli(dir.path(), &["sync", "pull"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not configured"));
}

#[test]
fn test_sync_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(dir.path(), &["sync", "status"]);
    assert_eq!(status["configured"], false);
    assert_eq!(status["writable"], false);
    assert!(status["last_sync_at"].is_null());

    let (_, stderr, code) = run_cli(dir.path(), &["sync", "now"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not configured"));
}
