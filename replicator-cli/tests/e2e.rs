//! End-to-end integration tests for replicator-cli
//!
//! Gated behind the `integration` feature flag. Run with:
//!
//! ```sh
//! cargo test -p replicator-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::process::Command;

/// Test that replicator --help works
#[test]
fn replicator_help_works() {
    let output = Command::new("cargo")
        .args(["run", "-p", "replicator-cli", "--", "--help"])
        .output()
        .expect("Failed to run replicator --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("credits"));
    assert!(stdout.contains("config"));
}

/// Test that config show works without a config file and never prints keys
#[test]
fn replicator_config_show_redacts_keys() {
    let temp_dir = tempfile::tempdir().unwrap();
    let output = Command::new("cargo")
        .args(["run", "-p", "replicator-cli", "--", "config", "show"])
        .env("REPLICATOR_PROJECT_CONFIG_DIR", temp_dir.path())
        .env("TRIPO_API_KEY", "tsk_do_not_print")
        .output()
        .expect("Failed to run replicator config show");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[server]"));
    assert!(!stdout.contains("tsk_do_not_print"));
}
