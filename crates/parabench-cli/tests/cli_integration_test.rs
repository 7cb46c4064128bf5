//! End-to-end tests for the parabench binary.
//!
//! @version 0.1.0
//! @author Parabench Development Team

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn parabench_cmd() -> Command {
    Command::cargo_bin("parabench").unwrap()
}

fn small_train() -> Command {
    let mut cmd = parabench_cmd();
    cmd.args(["train", "--batch-size", "4", "--steps", "2", "--no-progress"]);
    cmd
}

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_cli_help() {
    parabench_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("volume"));
}

#[test]
fn test_cli_version() {
    parabench_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("parabench"));
}

// =============================================================================
// Train
// =============================================================================

#[test]
fn test_train_single_rank() {
    small_train()
        .assert()
        .success()
        .stdout(predicate::str::contains("[Epoch 0 / Train]: Loss = "))
        .stdout(predicate::str::contains("[Epoch 0 / Test]: Loss = "))
        .stdout(predicate::str::contains("| Accuracy = "));
}

#[test]
fn test_train_profiled_world() {
    small_train()
        .args(["--world-size", "4", "--comm-profiler"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Communication time = "))
        .stdout(predicate::str::contains("MB/s"));
}

#[test]
fn test_train_two_d_language_model() {
    small_train()
        .args(["--model", "gpt2_small", "-n", "4", "--tp", "2d", "--tp-size", "4", "--amp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| Perplexity = "));
}

#[test]
fn test_train_from_config_file_writes_report() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bench.toml");
    let report = dir.path().join("report.json");
    fs::write(
        &config,
        "model = \"vit\"\nnum_epochs = 2\nworld_size = 2\n\n[shape]\nnum_classes = 4\n",
    )
    .unwrap();

    small_train()
        .arg("--config")
        .arg(&config)
        .arg("--report")
        .arg(&report)
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("[Epoch 1 / Test]"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    let reports = json.as_array().unwrap();
    assert_eq!(reports.len(), 4);
    // two replicas, two steps of four samples each
    assert_eq!(reports[0]["samples"], 16.0);
}

#[test]
fn test_train_rejects_bad_layout() {
    small_train()
        .args(["--world-size", "3", "--tp", "1d", "--tp-size", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("not divisible"));
}

#[test]
fn test_train_rejects_uneven_shards_before_training() {
    small_train()
        .args(["-n", "4", "--tp", "2d", "--tp-size", "4", "--batch-size", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size 5 is not divisible"))
        .stdout(predicate::str::contains("[Epoch 0 / Train]").not());
}

#[test]
fn test_train_mem_tracker_and_schedule() {
    small_train()
        .args(["--mem-tracker", "--lr-schedule", "cosine", "--warmup-steps", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| Peak memory = "))
        .stdout(predicate::str::contains("cosine, 1 warmup steps"));
}

#[test]
fn test_train_rejects_unknown_backend() {
    small_train()
        .args(["--backend", "nccl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported backend"));
}

#[test]
fn test_train_log_file() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("bench.log");
    small_train().arg("--log-file").arg(&log).assert().success();
    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("Benchmark start."));
    assert!(content.contains("Benchmark complete."));
}

// =============================================================================
// Volume and Init
// =============================================================================

#[test]
fn test_volume_all_reduce() {
    parabench_cmd()
        .args(["volume", "all-reduce", "-n", "4", "--bytes", "4096"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all_reduce over 4 ranks: 6144 bytes"));
}

#[test]
fn test_volume_requires_bytes() {
    parabench_cmd()
        .args(["volume", "broadcast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--bytes"));
}

#[test]
fn test_init_then_train_from_it() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("parabench.toml");

    parabench_cmd().arg("init").arg(&path).assert().success();
    assert!(path.exists());
    parabench_cmd()
        .arg("init")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    small_train().arg("--config").arg(&path).assert().success();
}
