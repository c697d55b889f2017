//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each test
//! points HOME at its own temporary directory so config and database files
//! never touch the real user profile.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "coinsmith-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("COINSMITH_ENV")
        .env("COINSMITH_LOG", "error")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (code, stdout, stderr) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("stdout is JSON")
}

#[test]
fn test_play_fast_perfect_session() {
    let home = tempfile::tempdir().unwrap();
    let report = run_json(
        home.path(),
        &[
            "play",
            "--moves",
            "5",
            "--time-limit",
            "60",
            "--move-interval",
            "1",
            "--frame",
            "0.5",
        ],
    );

    assert_eq!(report["payload"]["speed_tier"], "Speed Demon");
    assert_eq!(report["payload"]["accuracy_tier"], "Perfect");
    assert_eq!(report["payload"]["stars"], 3);
    assert_eq!(report["payload"]["final_score"], 2450);
    assert_eq!(report["progression"]["streak_level"], 1);
}

#[test]
fn test_play_persists_results_and_progress() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["play", "--moves", "2", "--time-limit", "60"]);
    run_json(home.path(), &["play", "--moves", "2", "--time-limit", "60"]);

    let progress = run_json(home.path(), &["progress", "show"]);
    assert_eq!(progress["streak_level"], 2);

    let results = run_json(home.path(), &["results", "list", "--limit", "1"]);
    assert_eq!(results.as_array().map(Vec::len), Some(1));

    let (code, _, _) = run_cli(home.path(), &["progress", "reset"]);
    assert_eq!(code, 0);
    let progress = run_json(home.path(), &["progress", "show"]);
    assert_eq!(progress["streak_level"], 0);
    assert_eq!(progress["personal_best_score"], 0);
}

#[test]
fn test_play_dry_run_leaves_no_results() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["play", "--moves", "1", "--dry-run"]);
    let results = run_json(home.path(), &["results", "list"]);
    assert_eq!(results.as_array().map(Vec::len), Some(0));
}

#[test]
fn test_play_past_limit_with_ad_extension() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(
        home.path(),
        &["config", "set", "extension.ad_success_chance", "1.0"],
    );
    assert_eq!(code, 0);

    // Four moves two seconds apart need more than the 5 second limit.
    let report = run_json(
        home.path(),
        &[
            "play",
            "--moves",
            "4",
            "--time-limit",
            "5",
            "--move-interval",
            "2",
            "--watch-ad",
            "--seed",
            "1",
        ],
    );
    assert_eq!(report["payload"]["time_extensions_used"], 1);
    assert_eq!(report["payload"]["coins"], 4);
    assert_eq!(report["payload"]["abandoned"], false);
    assert_eq!(report["time_given"], 5.0);
    assert!(report["time_taken"].as_f64().unwrap() > 6.0);
}

#[test]
fn test_play_without_extension_stops_at_limit() {
    let home = tempfile::tempdir().unwrap();
    let report = run_json(
        home.path(),
        &[
            "play",
            "--moves",
            "4",
            "--time-limit",
            "5",
            "--move-interval",
            "2",
        ],
    );
    assert_eq!(report["payload"]["time_extensions_used"], 0);
    assert_eq!(report["payload"]["coins"], 2);
    // Time-up lands within a frame of the limit.
    assert!(report["time_taken"].as_f64().unwrap() < 5.5);
}

#[test]
fn test_config_get_set_reset() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(home.path(), &["config", "get", "timer.initial_time"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "60.0");

    let (code, _, _) = run_cli(home.path(), &["config", "set", "scoring.base_score", "150"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "scoring.base_score"]);
    assert_eq!(stdout.trim(), "150");

    let (code, _, stderr) = run_cli(home.path(), &["config", "set", "scoring.nope", "1"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));

    let (code, _, _) = run_cli(home.path(), &["config", "reset"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "scoring.base_score"]);
    assert_eq!(stdout.trim(), "100");
}

#[test]
fn test_config_list() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("extension.ad_reward_seconds = 15.0"));

    let json = run_json(home.path(), &["config", "list", "--json"]);
    assert_eq!(json["rating"]["prefer_score_manager_stars"], true);
}

#[test]
fn test_unknown_subcommand_fails() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["nonexistent"]);
    assert_ne!(code, 0);
}
