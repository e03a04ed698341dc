//! Integration tests for the shellcache binary.
//!
//! Only paths that need no network are exercised here; the HTTP transport is
//! covered by the core crate's tests.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_shellcache"))
        .args(args)
        .env_remove("SHELLCACHE_CONFIG")
        .env_remove("SHELLCACHE_STORE_DIR")
        .env_remove("SHELLCACHE_VERSION")
        .output()
        .expect("Failed to execute shellcache")
}

fn write_config(dir: &Path, body: &str) -> String {
    let path = dir.join("config.json");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("install"));
    assert!(stdout.contains("stores"));
}

#[test]
fn test_init_config_then_show_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.json");
    let config = config.to_str().unwrap();

    let output = run_cli(&["init-config", "--config", config]);
    assert!(output.status.success());

    let again = run_cli(&["init-config", "--config", config]);
    assert!(!again.status.success(), "existing config must not be overwritten");

    let output = run_cli(&["show-config", "--config", config, "--version-tag", "v5"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"version\": \"v5\""));
    assert!(stdout.contains("core store:    core-v5"));
}

#[test]
fn test_stores_on_empty_dir() {
    let dir = TempDir::new().unwrap();
    let stores = dir.path().join("stores");
    let output = run_cli(&["stores", "--store-dir", stores.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No stores"));
}

#[test]
fn test_post_is_passed_through() {
    let dir = TempDir::new().unwrap();
    let stores = dir.path().join("stores");
    let output = run_cli(&[
        "get",
        "http://127.0.0.1:9/api/attendance",
        "--method",
        "POST",
        "--store-dir",
        stores.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("pass-through"));
    assert!(!stores.exists(), "pass-through must not touch the stores");
}

#[test]
fn test_install_against_unreachable_origin_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        r#"{"version": "v1", "origin": "http://127.0.0.1:9/", "shell_manifest": ["/", "/index.html"]}"#,
    );
    let stores = dir.path().join("stores");
    std::fs::create_dir_all(stores.join("core-v0")).unwrap();

    let output = run_cli(&["install", "--config", &config, "--store-dir", stores.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Provisioning failed"), "stderr: {}", stderr);
    // Commit still ran and pruned the old version
    assert!(!stores.join("core-v0").exists());
    assert!(stores.join("core-v1").exists());
}

#[test]
fn test_invalid_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), r#"{"version": "bad/tag"}"#);
    let output = run_cli(&["show-config", "--config", &config]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("version tag"));
}
