// SPDX-License-Identifier: Apache-2.0

use cmr_query::{SearchParams, SearchRequest};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use crate::cache::{cache_key, CacheTier};
use crate::http::{search_payload, ROUTE_SEARCH};
use crate::AppState;

/// Common queries primed into the list cache.
pub const WARM_TERMS: [&str; 18] = [
    "boots",
    "tesco",
    "asda",
    "sainsbury",
    "sainsburys",
    "battery",
    "solar",
    "wind",
    "gas",
    "diesel",
    "london",
    "manchester",
    "birmingham",
    "glasgow",
    "ev charging",
    "interconnector",
    "hydro",
    "biomass",
];

pub const WARM_STATUSES: [&str; 3] = ["all", "active", "inactive"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub requests: u64,
    pub written: u64,
    pub failed: u64,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

/// Prime the first list page of each common query under the same key the
/// list endpoint reads.
pub async fn warm_cache(state: &AppState, terms: &[&str]) -> WarmReport {
    let started = Instant::now();
    let mut report = WarmReport::default();
    for term in terms {
        for status in WARM_STATUSES {
            report.requests += 1;
            let params = SearchParams {
                q: Some((*term).to_string()),
                status: Some(status.to_string()),
                ..SearchParams::default()
            };
            let req = SearchRequest::from_params(&params, state.config.core.per_page_cap);
            let key = cache_key(ROUTE_SEARCH, &req.fingerprint());
            match search_payload(state, req).await {
                Ok(bytes) => {
                    if state.cache.set(&key, CacheTier::Medium, &bytes).await {
                        report.written += 1;
                        report.bytes += bytes.len() as u64;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(term = %term, status, error = %e, "warm query failed");
                }
            }
        }
    }
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        requests = report.requests,
        written = report.written,
        failed = report.failed,
        "cache warm finished"
    );
    report
}
