//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with HOME pointed at a temp directory so
//! the user's real config is never touched.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_focusmode"))
        .args(args)
        .env("HOME", home)
        .env_remove("FOCUSMODE_ENV")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

const LOCKED_SCENARIO: &str = r#"
baseline = 0.8

[[step]]
kind = "tick"
count = 10

[[step]]
kind = "lifecycle"
state = "background"

[[step]]
kind = "brightness"
reading = 0.01

[[step]]
kind = "tick"
count = 30

[[step]]
kind = "lifecycle"
state = "active"

[[step]]
kind = "give_up"
"#;

#[test]
fn test_config_get_default() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "reward.points_per_second"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "50");
}

#[test]
fn test_config_set_then_get() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "classifier.platform", "ios"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "classifier.platform"]);
    assert_eq!(stdout.trim(), "fine_grained");
}

#[test]
fn test_config_set_rejects_out_of_range() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["config", "set", "classifier.relative_brightness_ratio", "3"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_config_get_unknown_key_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "ui.dark_mode"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown config key"));
}

#[test]
fn test_config_list_and_path() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("classifier.sample_delay_ms = 500"));

    let (stdout, _, code) = run_cli(home.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with("focusmode/config.toml"));
}

#[test]
fn test_simulate_locked_scenario() {
    let home = tempfile::tempdir().unwrap();
    let scenario = home.path().join("locked.toml");
    std::fs::write(&scenario, LOCKED_SCENARIO).unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["simulate", scenario.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Timer was counting while your phone was asleep"));
    assert!(stdout.contains("elapsed: 00:40"));
    assert!(stdout.contains("points: 2000"));
}

#[test]
fn test_simulate_json_output() {
    let home = tempfile::tempdir().unwrap();
    let scenario = home.path().join("locked.toml");
    std::fs::write(&scenario, LOCKED_SCENARIO).unwrap();

    let (stdout, _, code) = run_cli(
        home.path(),
        &["simulate", scenario.to_str().unwrap(), "--json"],
    );
    assert_eq!(code, 0);
    let last = stdout.lines().last().unwrap();
    let summary: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(summary["snapshot"]["elapsed_seconds"], 40);
    assert_eq!(summary["snapshot"]["phase"], "terminated");
}

#[test]
fn test_simulate_missing_file_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["simulate", "does-not-exist.toml"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("cannot read"));
}
