// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use cmr_aggregate::{build_aggregates, AggregateOptions};
use cmr_core::CoreConfig;
use cmr_model::{ActiveYearTokens, Component};
use cmr_server::{build_router, AppState, ServerConfig, SmartCache};
use cmr_store::ComponentStore;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const LOCATIONS: usize = 30;
pub const COMPONENTS_PER_LOCATION: usize = 50;

const AUCTIONS: [&str; 6] = [
    "T-4 2024-25",
    "T-1 2023-24",
    "T-4 2022-23",
    "T-3 2021-22",
    "T-4 2020-21",
    "T-4 2019-20",
];

const DESCRIPTIONS: [&str; 3] = [
    "Open cycle gas turbine with black start capability serving the regional distribution network",
    "Battery energy storage system, two hour duration, co-located with the existing substation",
    "Standby diesel reciprocating engines aggregated under a single demand side response contract",
];

pub fn tokens() -> ActiveYearTokens {
    ActiveYearTokens::new(vec!["2024-25".to_string(), "2025-26".to_string()])
}

pub fn location_name(i: usize) -> String {
    format!("Capacity Site {i:02} Industrial Estate, Northfield")
}

fn component(location: usize, n: usize) -> Component {
    let id = location * COMPONENTS_PER_LOCATION + n;
    let sited = n == 0;
    Component {
        component_id: format!("COMP-{id:05}"),
        cmu_id: format!("CM-GB-{location:02}-{n:03}-BESS"),
        location: location_name(location),
        description: DESCRIPTIONS[n % DESCRIPTIONS.len()].to_string(),
        company_name: if n % 2 == 0 { "Northfield Power Ltd" } else { "Grid Storage plc" }.to_string(),
        technology: if n % 3 == 0 { "Gas" } else { "Battery" }.to_string(),
        auction_name: AUCTIONS[n % AUCTIONS.len()].to_string(),
        delivery_year: String::new(),
        status: String::new(),
        component_type: String::new(),
        derated_capacity_mw: Some(1.25),
        county: Some("West Midlands".to_string()),
        outward_code: Some(format!("B{}", location % 9 + 1)),
        latitude: sited.then_some(52.4 + location as f64 * 0.01),
        longitude: sited.then_some(-1.9),
        raw: BTreeMap::new(),
    }
}

/// File-backed store with groups built over every seeded location.
pub fn seed_database(path: &Path) {
    let mut store = ComponentStore::open(path).expect("store");
    let components: Vec<Component> = (0..LOCATIONS)
        .flat_map(|l| (0..COMPONENTS_PER_LOCATION).map(move |n| component(l, n)))
        .collect();
    store.upsert_batch(&components).expect("seed");
    let report = build_aggregates(&mut store, &tokens(), &AggregateOptions::default()).expect("build");
    assert!(report.gate.is_authoritative);
}

pub fn config(db_path: &Path) -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        db_path: db_path.to_path_buf(),
        core: CoreConfig {
            active_year_tokens: vec!["2024-25".to_string(), "2025-26".to_string()],
            ..CoreConfig::default()
        },
        ..ServerConfig::default()
    }
}

pub fn state(db_path: &Path) -> AppState {
    let cfg = config(db_path);
    let cache = SmartCache::in_memory(
        cfg.core.cache_ttl,
        cfg.core.redis_mem_threshold,
        cfg.core.redis_mem_cap_bytes,
    );
    AppState::new(cfg, cache)
}

pub async fn spawn(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

pub async fn send_raw(addr: SocketAddr, path: &str, headers: &[(&str, &str)]) -> RawResponse {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    stream.write_all(req.as_bytes()).await.expect("write request");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.expect("read response");
    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("http response must have separator");
    let head = String::from_utf8_lossy(&response[..split]).to_string();
    let body = response[split + 4..].to_vec();
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    RawResponse {
        status,
        headers,
        body,
    }
}
