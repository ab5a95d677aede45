// SPDX-License-Identifier: Apache-2.0

mod support;

use cmr_aggregate::generate_static_artifacts;
use cmr_store::{read_location_group_by_location, ComponentStore};
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::io::Read;
use support::{location_name, send_raw, seed_database, spawn, state, LOCATIONS};

const PER_REQUEST_BUDGET_BYTES: usize = 16 * 1024;

#[tokio::test]
async fn list_projection_stays_under_thirty_percent_of_full_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed_database(&db);
    let addr = spawn(state(&db)).await;

    let list = send_raw(addr, "/api/search?per_page=25", &[]).await;
    assert_eq!(list.status, 200);
    assert_eq!(list.header("x-cache"), Some("miss"));
    assert_eq!(list.header("content-length"), Some(list.body.len().to_string().as_str()));
    let listed = list.json();
    let rows = listed["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 25);
    assert!(rows.iter().all(|r| r.get("cmu_ids").is_none() && r.get("descriptions").is_none()));

    let store = ComponentStore::open_read_only(&db).expect("store");
    let full_rows: Vec<_> = rows
        .iter()
        .map(|r| {
            let location = r["location"].as_str().expect("location");
            read_location_group_by_location(store.connection(), location)
                .expect("read")
                .expect("group")
                .group
        })
        .collect();
    let mut full = listed.clone();
    full["rows"] = serde_json::to_value(&full_rows).expect("rows");
    let full_bytes = serde_json::to_vec(&full).expect("json").len();
    assert!(
        list.body.len() * 10 <= full_bytes * 3,
        "list {} bytes vs full {full_bytes} bytes",
        list.body.len()
    );

    let again = send_raw(addr, "/api/search?per_page=25", &[]).await;
    assert_eq!(again.header("x-cache"), Some("hit"));
    assert_eq!(again.body, list.body);
}

#[tokio::test]
async fn gzip_is_negotiated_and_decodes_to_the_plain_body() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed_database(&db);
    let addr = spawn(state(&db)).await;

    let plain = send_raw(addr, "/api/search?per_page=50", &[]).await;
    assert_eq!(plain.header("content-encoding"), None);
    let zipped = send_raw(addr, "/api/search?per_page=50", &[("Accept-Encoding", "gzip, deflate")]).await;
    assert_eq!(zipped.status, 200);
    assert_eq!(zipped.header("content-encoding"), Some("gzip"));
    assert_eq!(zipped.header("vary"), Some("accept-encoding"));
    assert_eq!(zipped.header("content-length"), Some(zipped.body.len().to_string().as_str()));
    assert!(zipped.body.len() < plain.body.len());
    let mut decoded = Vec::new();
    GzDecoder::new(zipped.body.as_slice())
        .read_to_end(&mut decoded)
        .expect("gunzip");
    assert_eq!(decoded, plain.body);

    // bodies under the threshold go out as-is
    let tiny = send_raw(addr, "/api/companies/suggest?q=zzz", &[("Accept-Encoding", "gzip")]).await;
    assert_eq!(tiny.header("content-encoding"), None);
}

/// Checked-in byte sizes for the seeded fixture. A response's baseline is its
/// envelope plus one item allowance per row, feature or component it carries.
const LIST_ENVELOPE_BYTES: usize = 160;
const LIST_ROW_BYTES: usize = 400;
const MAP_ENVELOPE_BYTES: usize = 100;
const MAP_FEATURE_BYTES: usize = 300;
const DETAIL_GROUP_BYTES: usize = 2_000;
const DETAIL_COMPONENT_BYTES: usize = 180;

fn pinned_baseline(endpoint: &str, body: &serde_json::Value) -> usize {
    let count = |key: &str| body[key].as_array().map_or(0, Vec::len);
    match endpoint {
        "/api/search" => LIST_ENVELOPE_BYTES + count("rows") * LIST_ROW_BYTES,
        "/api/map" => MAP_ENVELOPE_BYTES + count("features") * MAP_FEATURE_BYTES,
        _ => DETAIL_GROUP_BYTES + count("components") * DETAIL_COMPONENT_BYTES,
    }
}

#[tokio::test]
async fn replay_of_mixed_requests_stays_within_budget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed_database(&db);
    let addr = spawn(state(&db)).await;

    let store = ComponentStore::open_read_only(&db).expect("store");
    let ids: Vec<i64> = (0..LOCATIONS)
        .map(|i| {
            read_location_group_by_location(store.connection(), &location_name(i))
                .expect("read")
                .expect("group")
                .id
        })
        .collect();
    let queries = ["", "capacity", "northfield", "site 1", "grid"];
    let statuses = ["all", "active", "inactive"];

    let mut served: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut baseline: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for i in 0..100_usize {
        let q = queries[i % queries.len()].replace(' ', "+");
        let status = statuses[i % statuses.len()];
        let (endpoint, path) = match i % 3 {
            0 => (
                "/api/search",
                format!("/api/search?q={q}&status={status}&page={}&per_page=25", i % 2 + 1),
            ),
            1 => ("/api/map", format!("/api/map?q={q}&status={status}")),
            _ => ("/api/locations/:id", format!("/api/locations/{}", ids[i % ids.len()])),
        };
        let resp = send_raw(addr, &path, &[]).await;
        assert_eq!(resp.status, 200, "{path}");
        let body = resp.json();
        served.entry(endpoint).or_default().push(resp.body.len());
        baseline
            .entry(endpoint)
            .or_default()
            .push(pinned_baseline(endpoint, &body));
    }

    let mean = |v: &[usize]| v.iter().sum::<usize>() as f64 / v.len() as f64;
    let total: usize = served.values().flatten().sum();
    assert!(total < 100 * PER_REQUEST_BUDGET_BYTES, "replay moved {total} bytes");
    assert_eq!(served.len(), 3);
    for (endpoint, sizes) in &served {
        let expected = mean(&baseline[endpoint]);
        assert!(
            mean(sizes) <= expected * 1.2,
            "{endpoint}: mean {} bytes against pinned baseline {expected}",
            mean(sizes)
        );
    }

    let monitor = send_raw(addr, "/monitor", &[]).await.json();
    let egress = &monitor["egress"];
    assert_eq!(egress["records"], 100);
    for (endpoint, sizes) in &served {
        let rollup = &egress["endpoints"][*endpoint];
        assert_eq!(rollup["calls"].as_u64(), Some(sizes.len() as u64));
        assert_eq!(rollup["bytes"].as_u64(), Some(sizes.iter().sum::<usize>() as u64));
    }
    assert_eq!(monitor["cache"]["backend"], "memory");
    assert!(monitor["cache"]["hits"].as_u64().unwrap_or_default() > 0);
}

#[test]
fn pinned_baseline_grows_with_carried_items() {
    let list = serde_json::json!({"rows": [{}, {}, {}]});
    assert_eq!(pinned_baseline("/api/search", &list), LIST_ENVELOPE_BYTES + 3 * LIST_ROW_BYTES);
    let detail = serde_json::json!({"group": {}, "components": []});
    assert_eq!(pinned_baseline("/api/locations/:id", &detail), DETAIL_GROUP_BYTES);
}

#[tokio::test]
async fn missing_database_serves_flagged_empty_envelopes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let addr = spawn(state(&dir.path().join("absent.sqlite"))).await;

    let list = send_raw(addr, "/api/search?q=tesco&per_page=25", &[]).await;
    assert_eq!(list.status, 200);
    assert_eq!(list.header("x-cache"), Some("bypass"));
    let page = list.json();
    assert_eq!(page["error"], "store_unavailable");
    assert_eq!(page["rows"].as_array().map(Vec::len), Some(0));
    assert_eq!(page["per_page"], 25);

    let map = send_raw(addr, "/api/map?q=tesco", &[]).await.json();
    assert_eq!(map["type"], "FeatureCollection");
    assert_eq!(map["error"], "store_unavailable");

    let detail = send_raw(addr, "/api/locations/1", &[]).await;
    assert_eq!(detail.status, 503);
    assert_eq!(detail.json()["code"], "store_unavailable");

    // failures are never cached
    let retry = send_raw(addr, "/api/search?q=tesco&per_page=25", &[]).await;
    assert_eq!(retry.header("x-cache"), Some("bypass"));
}

#[tokio::test]
async fn detail_raw_suggest_and_static_routes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("cmr.sqlite");
    seed_database(&db);
    let artifacts = dir.path().join("static");
    {
        let store = ComponentStore::open_read_only(&db).expect("store");
        generate_static_artifacts(&store, &artifacts).expect("artifacts");
    }
    let mut cfg_state = state(&db);
    let mut config = (*cfg_state.config).clone();
    config.static_cache_dir = Some(artifacts);
    cfg_state.config = std::sync::Arc::new(config);
    let addr = spawn(cfg_state).await;

    let missing = send_raw(addr, "/api/locations/999999", &[]).await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.json()["code"], "not_found");

    let raw = send_raw(addr, "/api/components/COMP-00000/raw", &[]).await;
    assert_eq!(raw.status, 200);
    assert_eq!(raw.json()["component_id"], "COMP-00000");
    assert_eq!(send_raw(addr, "/api/components/NOPE/raw", &[]).await.status, 404);

    let suggest = send_raw(addr, "/api/companies/suggest?q=grid", &[]).await.json();
    assert_eq!(suggest["suggestions"][0]["company_name"], "Grid Storage plc");

    let index = send_raw(addr, "/static/cache/index.json", &[]).await;
    assert_eq!(index.status, 200);
    assert!(index.json()["files"].get("outward_locations.json").is_some());
    assert_eq!(send_raw(addr, "/static/cache/cmr.sqlite", &[]).await.status, 404);

    let health = send_raw(addr, "/healthz", &[]).await;
    assert_eq!(health.status, 200);
    assert_eq!(health.body, b"ok");
}
