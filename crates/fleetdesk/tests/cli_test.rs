//! Integration tests for the `fleetdesk` CLI binary.
//!
//! Argument parsing, help output, shell completions, and error exits,
//! none of which need a live directory.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

const ISOLATED_HOME: &str = "/tmp/fleetdesk-cli-test-nonexistent";

/// Build a command for the `fleetdesk` binary with env isolation.
///
/// Clears all `FLEETDESK_*` env vars and points config and data
/// directories at a nonexistent path so tests never touch real state.
fn fleetdesk_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fleetdesk");
    cmd.env("HOME", ISOLATED_HOME)
        .env("XDG_CONFIG_HOME", ISOLATED_HOME)
        .env("XDG_DATA_HOME", ISOLATED_HOME)
        .env_remove("FLEETDESK_PROFILE")
        .env_remove("FLEETDESK_DIRECTORY_URL")
        .env_remove("FLEETDESK_CUSTOMER")
        .env_remove("FLEETDESK_TOKEN")
        .env_remove("FLEETDESK_CACHE_DIR")
        .env_remove("FLEETDESK_OUTPUT")
        .env_remove("FLEETDESK_TIMEOUT");
    cmd
}

/// A command with a throwaway token and cache, enough to build a fleet
/// without contacting the directory.
fn offline_cmd(cache: &tempfile::TempDir) -> assert_cmd::Command {
    let mut cmd = fleetdesk_cmd();
    cmd.args(["--token", "test-token", "--cache-dir"])
        .arg(cache.path())
        .args(["--directory-url", "http://127.0.0.1:9"]);
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fleetdesk_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    fleetdesk_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Chromebook")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("batch"))
            .and(predicate::str::contains("tree")),
    );
}

#[test]
fn test_version_flag() {
    fleetdesk_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fleetdesk"));
}

#[test]
fn test_batch_help_lists_operations() {
    fleetdesk_cmd().args(["batch", "--help"]).assert().success().stdout(
        predicate::str::contains("checkout")
            .and(predicate::str::contains("checkin"))
            .and(predicate::str::contains("reset"))
            .and(predicate::str::contains("migrate")),
    );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    fleetdesk_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    fleetdesk_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = fleetdesk_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    fleetdesk_cmd()
        .args(["--output", "yaml", "devices", "list"])
        .assert()
        .code(2);
}

#[test]
fn test_devices_list_without_credentials() {
    fleetdesk_cmd()
        .args(["devices", "list"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("token").or(predicate::str::contains("credentials")));
}

#[test]
fn test_unknown_profile() {
    fleetdesk_cmd()
        .args(["--profile", "nowhere", "devices", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn test_subtree_requires_org_unit() {
    fleetdesk_cmd()
        .args(["devices", "list", "--subtree"])
        .assert()
        .code(2);
}

#[test]
fn test_config_show_no_config() {
    fleetdesk_cmd().args(["config", "show"]).assert().success();
}

// ── Offline commands against an empty cache ─────────────────────────

#[test]
fn test_devices_list_empty_cache() {
    let cache = tempfile::tempdir().unwrap();
    offline_cmd(&cache)
        .args(["-o", "json", "devices", "list"])
        .assert()
        .success();
}

#[test]
fn test_reset_refuses_without_yes_when_not_interactive() {
    let cache = tempfile::tempdir().unwrap();
    offline_cmd(&cache)
        .args(["batch", "reset", "SN1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("confirmation"));
}

#[test]
fn test_batch_without_targets() {
    let cache = tempfile::tempdir().unwrap();
    offline_cmd(&cache)
        .args(["batch", "checkin"])
        .assert()
        .code(2);
}
