// SPDX-License-Identifier: Apache-2.0

use assert_cmd::Command;
use cmr_model::Component;
use cmr_store::ComponentStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

fn component(id: &str, location: &str, company: &str, auction: &str) -> Component {
    Component {
        component_id: id.to_string(),
        cmu_id: format!("CMU-{id}"),
        location: location.to_string(),
        description: format!("Unit {id}"),
        company_name: company.to_string(),
        technology: "Battery".to_string(),
        auction_name: auction.to_string(),
        delivery_year: String::new(),
        status: String::new(),
        component_type: String::new(),
        derated_capacity_mw: Some(2.0),
        county: None,
        outward_code: Some("SW11".to_string()),
        latitude: Some(51.46),
        longitude: Some(-0.16),
        raw: BTreeMap::new(),
    }
}

fn seed(db: &Path) {
    let mut store = ComponentStore::open(db).expect("open store");
    store
        .upsert_batch(&[
            component("1", "Asda Battersea, SW11 5BP", "Asda", "T-4 2024-25"),
            component("2", "Asda Battersea, SW11 5BP", "Asda", "T-1 2022-23"),
            component("3", "Tesco Extra,  KA1   3TN", "Tesco", "T-4 2024-25"),
            component("4", "TBC", "Tesco", "T-4 2024-25"),
        ])
        .expect("seed");
}

fn cmr(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cmr").expect("binary");
    cmd.env_remove("CMR_REDIS_URL")
        .env_remove("CMR_PER_PAGE_CAP")
        .env_remove("CMR_STATIC_CACHE_DIR")
        .env("CMR_ACTIVE_YEAR_TOKENS", "2024-25,2025-26")
        .env("RUST_LOG", "warn")
        .arg("--json")
        .arg("--db")
        .arg(db);
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("json summary on stdout")
}

#[test]
fn missing_command_is_a_usage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = cmr(&dir.path().join("cmr.sqlite")).output().expect("run");
    assert_eq!(output.status.code(), Some(2));
    let err: Value = serde_json::from_slice(&output.stderr).expect("machine error");
    assert_eq!(err["code"], "usage_error");
}

#[test]
fn invalid_page_cap_is_rejected_before_any_job_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    let output = cmr(&db)
        .env("CMR_PER_PAGE_CAP", "5")
        .arg("build-aggregates")
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(3));
    let err: Value = serde_json::from_slice(&output.stderr).expect("machine error");
    assert_eq!(err["code"], "config_invalid");
    assert!(!db.exists());
}

#[test]
fn build_aggregates_reports_an_authoritative_gate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed(&db);
    let output = cmr(&db).arg("build-aggregates").output().expect("run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["mode"], "standard");
    assert_eq!(report["groups_created"], 2);
    assert_eq!(report["gate"]["total_components"], 3);
    assert_eq!(report["gate"]["is_authoritative"], true);
    assert!(!dir.path().join("cmr.sqlite.lock").exists());

    let fast = cmr(&db).arg("build-aggregates-fast").output().expect("run");
    assert!(fast.status.success());
    let report = stdout_json(&fast);
    assert_eq!(report["mode"], "fast");
    assert_eq!(report["groups_updated"], 2);
}

#[test]
fn held_lock_blocks_a_second_writer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed(&db);
    let _held = cmr_store::RunLock::acquire(&db, "crawl").expect("lock");
    let output = cmr(&db).arg("build-aggregates").output().expect("run");
    assert_eq!(output.status.code(), Some(4));
    let err: Value = serde_json::from_slice(&output.stderr).expect("machine error");
    assert_eq!(err["code"], "run_locked");
}

#[test]
fn company_links_cover_every_company() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed(&db);
    let output = cmr(&db)
        .args(["build-company-links", "--full-rebuild"])
        .output()
        .expect("run");
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["companies"], 2);
}

#[test]
fn static_caches_land_in_the_requested_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    let out = dir.path().join("static");
    seed(&db);
    let output = cmr(&db)
        .arg("generate-static-caches")
        .arg("--out-dir")
        .arg(&out)
        .output()
        .expect("run");
    assert!(output.status.success());
    let index = stdout_json(&output);
    assert_eq!(index["stats"]["components"], 3);
    for name in [
        "index.json",
        "outward_locations.json",
        "location_coordinates.json",
        "trigram_locations.json",
        "location_components.json",
    ] {
        assert!(out.join(name).exists(), "{name} missing");
    }
}

#[test]
fn read_only_jobs_never_create_a_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("typo.sqlite");
    for args in [
        vec!["check-freshness", "--no-email", "--endpoint", "http://127.0.0.1:1"],
        vec!["generate-static-caches"],
    ] {
        let output = cmr(&db).args(&args).output().expect("run");
        assert_eq!(output.status.code(), Some(3), "{args:?}");
        let err: Value = serde_json::from_slice(&output.stderr).expect("machine error");
        assert_eq!(err["code"], "store_missing");
        assert!(!db.exists(), "{args:?} created the database");
    }
}

#[test]
fn normalize_dry_run_leaves_rows_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed(&db);
    let output = cmr(&db)
        .args(["normalize-locations", "--dry-run"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["changed"], 1);
    assert_eq!(report["samples"][0][1], "Tesco Extra, KA1 3TN");

    let store = ComponentStore::open_read_only(&db).expect("reopen");
    assert_eq!(store.bulk_by_location("Tesco Extra,  KA1   3TN").expect("rows").len(), 1);
}

#[test]
fn crawl_against_unreachable_upstream_exits_with_dependency_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("data").join("cmr.sqlite");
    let output = cmr(&db)
        .args([
            "crawl",
            "--max-retries",
            "0",
            "--max-pages",
            "1",
            "--endpoint",
            "http://127.0.0.1:1/api/3/action/datastore_search",
        ])
        .env("CMR_CRAWL_SLEEP_MS", "0")
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(4));
    let report = stdout_json(&output);
    assert!(report["aborted"].is_string());
    let err: Value = serde_json::from_slice(&output.stderr).expect("machine error");
    assert_eq!(err["code"], "upstream_unavailable");
}

#[test]
fn warm_cache_primes_every_term_and_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed(&db);
    assert!(cmr(&db).arg("build-aggregates").output().expect("build").status.success());
    let output = cmr(&db).arg("warm-cache").output().expect("run");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["requests"], 54);
    assert_eq!(report["written"], 54);
    assert_eq!(report["failed"], 0);
}
