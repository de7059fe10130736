//! End-to-end tests for the `driftsync` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn driftsync(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("driftsync").unwrap();
    cmd.arg("--data-dir").arg(data_dir).env_remove("RUST_LOG");
    cmd
}

fn init(data_dir: &Path, remote: &Path, device_id: &str) {
    driftsync(data_dir)
        .arg("--remote")
        .arg(remote)
        .args(["init", "--device-id", device_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Device initialized"));
}

#[test]
fn commands_require_init() {
    let dir = tempdir().unwrap();

    driftsync(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn init_requires_remote() {
    let dir = tempdir().unwrap();

    driftsync(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--remote"));
}

#[test]
fn values_sync_between_devices() {
    let root = tempdir().unwrap();
    let remote = root.path().join("shared");
    let laptop = root.path().join("laptop");
    let phone = root.path().join("phone");
    init(&laptop, &remote, "laptop");
    init(&phone, &remote, "phone");

    driftsync(&laptop)
        .args(["set", "notes/1", r#"{"title": "groceries"}"#])
        .assert()
        .success();
    driftsync(&laptop)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 pending entries"));

    driftsync(&laptop)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pushed:    1"));
    driftsync(&phone)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pulled:    1"));

    driftsync(&phone)
        .args(["get", "notes/1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("groceries"));

    driftsync(&laptop)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing pending"));
}

#[test]
fn deletes_propagate() {
    let root = tempdir().unwrap();
    let remote = root.path().join("shared");
    let laptop = root.path().join("laptop");
    let phone = root.path().join("phone");
    init(&laptop, &remote, "laptop");
    init(&phone, &remote, "phone");

    driftsync(&laptop).args(["set", "k", "1"]).assert().success();
    driftsync(&laptop).arg("sync").assert().success();
    driftsync(&phone).arg("sync").assert().success();

    driftsync(&laptop).args(["delete", "k"]).assert().success();
    driftsync(&laptop).arg("sync").assert().success();
    driftsync(&phone).arg("sync").assert().success();

    driftsync(&phone)
        .args(["get", "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No value"));
}

#[test]
fn invalid_json_value_is_rejected() {
    let root = tempdir().unwrap();
    let laptop = root.path().join("laptop");
    init(&laptop, &root.path().join("shared"), "laptop");

    driftsync(&laptop)
        .args(["set", "k", "not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn unreachable_remote_fails_sync_and_keeps_queue() {
    let root = tempdir().unwrap();
    let laptop = root.path().join("laptop");
    init(&laptop, &root.path().join("shared"), "laptop");
    driftsync(&laptop).args(["set", "k", "1"]).assert().success();

    driftsync(&laptop)
        .arg("--remote")
        .arg(root.path().join("missing"))
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));

    driftsync(&laptop)
        .arg("pending")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 pending entries"));
}

#[test]
fn status_reports_counts() {
    let root = tempdir().unwrap();
    let laptop = root.path().join("laptop");
    init(&laptop, &root.path().join("shared"), "laptop");
    driftsync(&laptop).args(["set", "k", "1"]).assert().success();

    driftsync(&laptop)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("ID:     laptop"))
        .stdout(predicate::str::contains("Pending:   1"))
        .stdout(predicate::str::contains("Last sync: never"));
}
