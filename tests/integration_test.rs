//! Black-box integration tests for the `guide-weaver` binary.
//!
//! Drives the CLI surface end to end against a temp-file `SQLite`
//! store, using `--dry-run` so no network access or LLM credentials
//! are required (`cli::dryrun`).

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn guide_weaver() -> Command {
    Command::cargo_bin("guide-weaver").expect("binary should build")
}

fn db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("guide-weaver.db")
}

#[test]
fn init_creates_the_database_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);

    guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    assert!(path.exists());
}

#[test]
fn status_on_a_fresh_store_reports_zero_counts() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);

    guide_weaver().arg("--db-path").arg(&path).arg("init").assert().success();

    guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"Alignments:\s+0").unwrap())
        .stdout(predicate::str::is_match(r"Explanations:\s+0").unwrap());
}

#[test]
fn status_json_round_trips_through_serde() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);
    guide_weaver().arg("--db-path").arg(&path).arg("init").assert().success();

    let output = guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("--format")
        .arg("json")
        .arg("status")
        .output()
        .expect("status should run");
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(parsed["alignment_count"], 0);
    assert_eq!(parsed["canonical_guide_count"], 0);
}

#[test]
fn guide_dry_run_produces_a_validated_hebrew_summary() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);
    guide_weaver().arg("--db-path").arg(&path).arg("init").assert().success();

    guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("guide")
        .arg("Orach Chayim")
        .arg("24")
        .arg("--paragraph")
        .arg("1")
        .arg("--corpora")
        .arg("primary")
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Orach Chayim"))
        .stdout(predicate::str::contains("Fingerprint:"));
}

#[test]
fn guide_dry_run_is_cached_on_second_identical_request() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);
    guide_weaver().arg("--db-path").arg(&path).arg("init").assert().success();

    let args = [
        "guide",
        "Orach Chayim",
        "24",
        "--paragraph",
        "1",
        "--corpora",
        "primary",
        "--dry-run",
    ];

    let first = guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .args(args)
        .arg("--format")
        .arg("json")
        .output()
        .expect("first guide run");
    assert!(first.status.success());
    let first: serde_json::Value = serde_json::from_slice(&first.stdout).expect("valid json");
    let fingerprint = first["guide"]["fingerprint"].as_str().expect("fingerprint present").to_string();

    let second = guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .args(args)
        .arg("--format")
        .arg("json")
        .output()
        .expect("second guide run");
    assert!(second.status.success());
    let second: serde_json::Value = serde_json::from_slice(&second.stdout).expect("valid json");
    assert_eq!(second["guide"]["fingerprint"].as_str(), Some(fingerprint.as_str()));

    let status = guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("--format")
        .arg("json")
        .arg("status")
        .output()
        .expect("status run");
    let status: serde_json::Value = serde_json::from_slice(&status.stdout).expect("valid json");
    assert_eq!(status["canonical_ready_count"], 1);
}

#[test]
fn guide_rejects_an_unrecognized_section() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);
    guide_weaver().arg("--db-path").arg(&path).arg("init").assert().success();

    guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("guide")
        .arg("Not A Real Section")
        .arg("1")
        .arg("--dry-run")
        .assert()
        .failure();
}

#[test]
fn guide_rejects_an_unknown_corpus_slug() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);
    guide_weaver().arg("--db-path").arg(&path).arg("init").assert().success();

    guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("guide")
        .arg("Orach Chayim")
        .arg("24")
        .arg("--corpora")
        .arg("not-a-corpus")
        .arg("--dry-run")
        .assert()
        .failure();
}

#[test]
fn status_without_a_prior_init_lazily_creates_the_store() {
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);

    // `status` opens the store the same way `init` does, so it
    // succeeds (and creates the file) even without a prior `init` call.
    guide_weaver()
        .arg("--db-path")
        .arg(&path)
        .arg("status")
        .assert()
        .success();
    assert!(path.exists());
}
