//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end. Generation runs with
//! `--provider none`, so no network access is needed.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary to test.
fn repowhisper() -> Command {
    let mut cmd = Command::cargo_bin("repowhisper").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("REPOWHISPER_PROVIDER");
    cmd
}

fn node_project() -> assert_fs::TempDir {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("package.json")
        .write_str(r#"{"name": "api", "dependencies": {"express": "^4.18.0"}, "scripts": {"start": "node index.js"}}"#)
        .unwrap();
    dir.child("index.js").write_str("const express = require('express');\n").unwrap();
    dir.child("routes/users.js").write_str("module.exports = [];\n").unwrap();
    dir.child("node_modules/express/index.js").write_str("// vendored\n").unwrap();
    dir
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    repowhisper()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generate a README"));
}

#[test]
fn test_version_flag() {
    repowhisper()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_generate_help_lists_options() {
    repowhisper()
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-iterations"))
        .stdout(predicate::str::contains("--resume"));
}

#[test]
fn test_missing_subcommand_fails() {
    repowhisper().assert().failure();
}

// ============================================================================
// Analyze Command Tests
// ============================================================================

#[test]
fn test_analyze_json() {
    let dir = node_project();

    repowhisper()
        .args(["analyze", "--format", "json"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"package.json\""))
        .stdout(predicate::str::contains("routes/users.js"))
        .stdout(predicate::str::contains("node_modules").not());
}

#[test]
fn test_analyze_text() {
    let dir = node_project();

    repowhisper()
        .arg("analyze")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("package.json: 1 dependencies"))
        .stdout(predicate::str::contains("index.js"));
}

#[test]
fn test_analyze_missing_directory() {
    repowhisper()
        .args(["analyze", "/definitely/not/a/dir"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a directory"));
}

// ============================================================================
// Generate Command Tests
// ============================================================================

#[test]
fn test_generate_offline_prints_fallback_readme() {
    let dir = node_project();

    repowhisper()
        .args(["generate", "--provider", "none"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("## Installation"))
        .stdout(predicate::str::contains("npm install"));

    dir.child("index.js").assert(predicate::path::exists());
}

#[test]
fn test_generate_writes_output_file() {
    let dir = node_project();
    let out = assert_fs::TempDir::new().unwrap();
    let readme = out.child("README.md");

    repowhisper()
        .args(["generate", "--provider", "none", "-o"])
        .arg(readme.path())
        .arg(dir.path())
        .assert()
        .success();

    readme.assert(predicate::str::contains("## Tech Stack"));
}

#[test]
fn test_generate_json_report() {
    let dir = node_project();

    let output = repowhisper()
        .args(["generate", "--provider", "none", "--format", "json", "--run-id", "api-run"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["run_id"], "api-run");
    assert_eq!(report["iterations"], 2);
    assert_eq!(report["decisions"].as_array().unwrap().len(), 2);
    assert_eq!(report["decisions"][0]["actor"], "analyze");
    assert!(report["readme"].as_str().unwrap().contains("npm install"));
}

#[test]
fn test_generate_zero_iterations_aborts() {
    let dir = node_project();

    repowhisper()
        .args(["generate", "--provider", "none", "--max-iterations", "0"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("aborted"));
}

#[test]
fn test_generate_unknown_provider_fails() {
    let dir = node_project();

    repowhisper()
        .args(["generate", "--provider", "gpt-9000"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("gpt-9000"));
}

// ============================================================================
// Config & Completions Tests
// ============================================================================

#[test]
fn test_config_from_explicit_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.child("custom.toml");
    config.write_str("[workflow]\nmax_iterations = 9\n").unwrap();

    repowhisper()
        .arg("--config")
        .arg(config.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_iterations = 9"));
}

#[test]
fn test_config_path_flag() {
    repowhisper()
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_path_prefers_local_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child(".repowhisper.toml").write_str("[workflow]\nmax_iterations = 3\n").unwrap();

    repowhisper()
        .current_dir(dir.path())
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".repowhisper.toml"));

    repowhisper()
        .current_dir(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_iterations = 3"));
}

#[test]
fn test_bash_completions() {
    repowhisper()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("repowhisper"));
}
