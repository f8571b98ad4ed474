//! CLI argument-validation and exit-code tests. No network: every case
//! fails (or succeeds) before any registry is contacted.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn stevedore() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("stevedore"))
}

#[test]
fn promote_requires_a_manifest() {
    stevedore()
        .arg("promote")
        .assert()
        .failure()
        .stderr(contains("--manifest"));
}

#[test]
fn promote_missing_manifest_file_exits_nonzero() {
    let dir = TempDir::new().expect("tempdir");
    stevedore()
        .args(["promote", "--manifest"])
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(contains("manifest"));
}

#[test]
fn promote_rejects_malformed_manifest_with_path_in_message() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, ": : not : yaml [").expect("write");

    stevedore()
        .args(["promote", "--manifest"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("broken.yaml"));
}

#[test]
fn promote_rejects_manifest_without_source_registry() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("no-src.yaml");
    std::fs::write(
        &path,
        "registries:\n- name: gcr.io/a\n- name: gcr.io/b\nimages: []\n",
    )
    .expect("write");

    stevedore()
        .args(["promote", "--manifest"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("source registry"));
}

#[test]
fn dry_run_preview_with_unreachable_registries_still_exits_zero() {
    // Registry names without a path prefix fail to resolve before any
    // network traffic; with no images declared there is nothing to drop,
    // so the preview succeeds with warnings.
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("empty.yaml");
    std::fs::write(
        &path,
        "registries:\n- name: src-registry\n  src: true\n- name: dst-registry\nimages: []\n",
    )
    .expect("write");

    stevedore()
        .args(["promote", "--manifest"])
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("[dry-run]"));
}

#[test]
fn snapshot_rejects_unknown_format() {
    stevedore()
        .args(["snapshot", "gcr.io/prod", "--format", "json"])
        .assert()
        .failure()
        .stderr(contains("yaml, csv"));
}

#[test]
fn snapshot_rejects_bad_registry_name_without_network() {
    stevedore()
        .args(["snapshot", "not-a-registry"])
        .assert()
        .failure()
        .stderr(contains("not of the form"));
}
