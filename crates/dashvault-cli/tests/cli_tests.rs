//! Integration tests for the `dashvault` CLI binary.
//!
//! Each test runs the binary as a subprocess against a vault file in its own
//! temp directory, with the production PBKDF2 work factor.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Helper: locate the `dashvault` binary built by `cargo test`.
fn dashvault_bin() -> String {
    let path = env!("CARGO_BIN_EXE_dashvault");
    assert!(
        Path::new(path).exists(),
        "dashvault binary not found at {path}"
    );
    path.to_owned()
}

fn vault_path(dir: &TempDir) -> PathBuf {
    dir.path().join("vault").join("dashvault.redb")
}

/// Helper: run dashvault with args and return (`exit_code`, stdout, stderr).
fn run(dir: &TempDir, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(dashvault_bin())
        .args(args)
        .env("DASHVAULT_PATH", vault_path(dir))
        .env_remove("DASHVAULT_PASSWORD")
        .env_remove("DASHVAULT_NEW_PASSWORD")
        .env_remove("DASHVAULT_STORAGE_KEY")
        .env_remove("DASHVAULT_KDF_ITERATIONS")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute dashvault");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn init(dir: &TempDir, password: &str, tokens: &[&str]) {
    let mut args = vec!["--password", password, "init"];
    for token in tokens {
        args.push("--token");
        args.push(token);
    }
    let (code, stdout, stderr) = run(dir, &args);
    assert_eq!(code, 0, "init should succeed: {stdout} {stderr}");
}

// ── Help ─────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run(&dir, &["--help"]);
    assert_eq!(code, 0);
    for cmd in ["status", "init", "unlock", "get", "set", "clear", "list", "passwd", "wipe"] {
        assert!(stdout.contains(cmd), "help should list '{cmd}': {stdout}");
    }
}

#[test]
fn test_help_does_not_advertise_password_flag() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run(&dir, &["--help"]);
    assert_eq!(code, 0);
    assert!(!stdout.contains("--password"), "help: {stdout}");
    assert!(stdout.contains("DASHVAULT_PASSWORD"), "help: {stdout}");
}

// ── Status ───────────────────────────────────────────────────────────

#[test]
fn test_status_without_vault() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run(&dir, &["status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No vault"), "status: {stdout}");
}

#[test]
fn test_status_json_after_init() {
    let dir = TempDir::new().unwrap();
    init(&dir, "correct-horse", &["todoist=tok-123"]);

    let (code, stdout, _) = run(&dir, &["status", "--json"]);
    assert_eq!(code, 0);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["status"]["state"], "locked");
    assert_eq!(body["status"]["has_vault"], true);
}

// ── Setup and retrieve ───────────────────────────────────────────────

#[test]
fn test_init_then_get_in_new_session() {
    let dir = TempDir::new().unwrap();
    init(&dir, "correct-horse", &["todoist=tok-123"]);

    let (code, stdout, _) = run(&dir, &["--password", "correct-horse", "get", "todoist"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "tok-123");
}

#[test]
fn test_password_from_environment() {
    let dir = TempDir::new().unwrap();
    init(&dir, "correct-horse", &["todoist=tok-123"]);

    let output = Command::new(dashvault_bin())
        .args(["get", "todoist"])
        .env("DASHVAULT_PATH", vault_path(&dir))
        .env("DASHVAULT_PASSWORD", "correct-horse")
        .env_remove("DASHVAULT_KDF_ITERATIONS")
        .env_remove("DASHVAULT_STORAGE_KEY")
        .output()
        .expect("failed to execute dashvault");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "tok-123");
}

#[test]
fn test_wrong_password_fails() {
    let dir = TempDir::new().unwrap();
    init(&dir, "correct-horse", &["todoist=tok-123"]);

    let (code, stdout, stderr) = run(&dir, &["--password", "wrong-pw", "get", "todoist"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("incorrect password"), "stderr: {stderr}");
    assert!(!stdout.contains("tok-123"));

    let (code, _, stderr) = run(&dir, &["--password", "wrong-pw", "unlock"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("incorrect password"), "stderr: {stderr}");
}

#[test]
fn test_missing_password_is_reported() {
    let dir = TempDir::new().unwrap();
    init(&dir, "correct-horse", &[]);

    let (code, _, stderr) = run(&dir, &["get", "todoist"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("DASHVAULT_PASSWORD"), "stderr: {stderr}");
}

#[test]
fn test_get_without_vault_fails() {
    let dir = TempDir::new().unwrap();
    let (code, _, stderr) = run(&dir, &["--password", "pw", "get", "todoist"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("no vault"), "stderr: {stderr}");
}

// ── Token writes ─────────────────────────────────────────────────────

#[test]
fn test_set_list_clear_roundtrip() {
    let dir = TempDir::new().unwrap();
    init(&dir, "pw", &[]);

    let (code, _, _) = run(&dir, &["--password", "pw", "set", "webex", "abc"]);
    assert_eq!(code, 0);

    let (code, stdout, _) = run(&dir, &["--password", "pw", "list"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "webex");

    let (code, _, _) = run(&dir, &["--password", "pw", "clear", "webex"]);
    assert_eq!(code, 0);

    let (code, _, stderr) = run(&dir, &["--password", "pw", "get", "webex"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("no token configured"), "stderr: {stderr}");
}

#[test]
fn test_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    init(&dir, "first", &["todoist=a"]);

    let (code, _, stderr) = run(&dir, &["--password", "second", "init"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--force"), "stderr: {stderr}");

    let (code, _, _) = run(&dir, &["--password", "second", "init", "--force"]);
    assert_eq!(code, 0);
    let (code, _, _) = run(&dir, &["--password", "first", "unlock"]);
    assert_ne!(code, 0);
}

#[test]
fn test_init_rejects_malformed_token() {
    let dir = TempDir::new().unwrap();
    let (code, _, stderr) = run(&dir, &["--password", "pw", "init", "--token", "todoist"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("SERVICE=TOKEN"), "stderr: {stderr}");
}

// ── Password change ──────────────────────────────────────────────────

#[test]
fn test_passwd_rotates_password() {
    let dir = TempDir::new().unwrap();
    init(&dir, "old-pw", &["todoist=tok-123"]);

    let (code, _, stderr) = run(
        &dir,
        &["--password", "old-pw", "passwd", "--new-password", "new-pw"],
    );
    assert_eq!(code, 0, "passwd: {stderr}");

    let (code, _, _) = run(&dir, &["--password", "old-pw", "unlock"]);
    assert_ne!(code, 0);
    let (code, stdout, _) = run(&dir, &["--password", "new-pw", "get", "todoist"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "tok-123");
}

// ── Wipe ─────────────────────────────────────────────────────────────

#[test]
fn test_wipe_requires_confirmation_and_destroys_vault() {
    let dir = TempDir::new().unwrap();
    init(&dir, "pw", &["todoist=tok-123"]);

    let (code, _, stderr) = run(&dir, &["wipe"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--yes"), "stderr: {stderr}");

    let (code, _, _) = run(&dir, &["wipe", "--yes"]);
    assert_eq!(code, 0);

    let (code, stdout, _) = run(&dir, &["status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No vault"), "status: {stdout}");

    let (code, _, stderr) = run(&dir, &["--password", "pw", "unlock"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("no vault"), "stderr: {stderr}");
}
