//! CLI end-to-end tests exercising migration-shaped schemas end to end:
//! precision tolerance, alias renaming, and keyed arrays, each driven
//! entirely through the `migration-diff compare` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("migration-diff").expect("binary should exist")
}

fn write_fixture(dir: &TempDir, name: &str, value: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

#[test]
fn test_price_rounding_within_precision_matches() {
    let dir = TempDir::new().unwrap();
    let schema = write_fixture(
        &dir,
        "schema.json",
        &serde_json::json!({
            "type": "object",
            "properties": { "total": { "x-migration-precision": 0.01 } }
        }),
    );
    let baseline = write_fixture(&dir, "baseline.json", &serde_json::json!({ "total": 19.99 }));
    let candidate = write_fixture(&dir, "candidate.json", &serde_json::json!({ "total": 19.995 }));

    cmd()
        .args(["compare", baseline.to_str().unwrap(), candidate.to_str().unwrap()])
        .args(["--schema", schema.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_match\": true"));
}

#[test]
fn test_renamed_field_matches_via_alias() {
    let dir = TempDir::new().unwrap();
    let schema = write_fixture(
        &dir,
        "schema.json",
        &serde_json::json!({
            "type": "object",
            "properties": {
                "fullName": { "x-migration-alias": "name" }
            }
        }),
    );
    let baseline = write_fixture(&dir, "baseline.json", &serde_json::json!({ "name": "Ada Lovelace" }));
    let candidate = write_fixture(
        &dir,
        "candidate.json",
        &serde_json::json!({ "fullName": "Ada Lovelace" }),
    );

    cmd()
        .args(["compare", baseline.to_str().unwrap(), candidate.to_str().unwrap()])
        .args(["--schema", schema.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_match\": true"));
}

#[test]
fn test_keyed_array_reorder_matches_with_trace() {
    let dir = TempDir::new().unwrap();
    let schema = write_fixture(
        &dir,
        "schema.json",
        &serde_json::json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "x-migration-array-mode": "keyed",
                    "x-migration-array-key": "sku",
                    "items": { "type": "object" }
                }
            }
        }),
    );
    let baseline = write_fixture(
        &dir,
        "baseline.json",
        &serde_json::json!({ "items": [{"sku": "A", "qty": 1}, {"sku": "B", "qty": 2}] }),
    );
    let candidate = write_fixture(
        &dir,
        "candidate.json",
        &serde_json::json!({ "items": [{"sku": "B", "qty": 2}, {"sku": "A", "qty": 1}] }),
    );

    cmd()
        .args(["compare", baseline.to_str().unwrap(), candidate.to_str().unwrap()])
        .args(["--schema", schema.to_str().unwrap()])
        .arg("--trace")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_match\": true"));
}

#[test]
fn test_datetime_tolerance_allows_small_clock_skew() {
    let dir = TempDir::new().unwrap();
    let schema = write_fixture(
        &dir,
        "schema.json",
        &serde_json::json!({
            "type": "object",
            "properties": {
                "createdAt": { "x-migration-datetime-tolerance": "5s" }
            }
        }),
    );
    let baseline = write_fixture(
        &dir,
        "baseline.json",
        &serde_json::json!({ "createdAt": "2025-02-02T10:30:00Z" }),
    );
    let candidate = write_fixture(
        &dir,
        "candidate.json",
        &serde_json::json!({ "createdAt": "2025-02-02T10:30:02Z" }),
    );

    cmd()
        .args(["compare", baseline.to_str().unwrap(), candidate.to_str().unwrap()])
        .args(["--schema", schema.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_match\": true"));
}

#[test]
fn test_datetime_beyond_tolerance_reports_datetime_exceeded() {
    let dir = TempDir::new().unwrap();
    let schema = write_fixture(
        &dir,
        "schema.json",
        &serde_json::json!({
            "type": "object",
            "properties": {
                "createdAt": { "x-migration-datetime-tolerance": "5s" }
            }
        }),
    );
    let baseline = write_fixture(
        &dir,
        "baseline.json",
        &serde_json::json!({ "createdAt": "2025-02-02T10:30:00Z" }),
    );
    let candidate = write_fixture(
        &dir,
        "candidate.json",
        &serde_json::json!({ "createdAt": "2025-02-02T10:31:00Z" }),
    );
    let output = dir.path().join("report.json");

    cmd()
        .args(["compare", baseline.to_str().unwrap(), candidate.to_str().unwrap()])
        .args(["--schema", schema.to_str().unwrap()])
        .args(["-o", output.to_str().unwrap()])
        .assert()
        .code(1);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["diffs"][0]["type"], serde_json::json!("DATETIME_EXCEEDED"));
}
