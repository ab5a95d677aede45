// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use cmr_aggregate::{build_aggregates, AggregateOptions};
use cmr_model::{ActiveYearTokens, Component};
use cmr_query::{SearchRequest, StatusFilter};
use cmr_store::{decode_group_row, ComponentStore, StoredGroup, GROUP_COLUMNS};
use std::collections::{BTreeMap, BTreeSet};

pub fn tokens() -> ActiveYearTokens {
    ActiveYearTokens::new(vec!["2024-25".to_string(), "2025-26".to_string()])
}

pub fn component(id: &str, location: &str, company: &str, tech: &str, auction: &str) -> Component {
    Component {
        component_id: id.to_string(),
        cmu_id: format!("CMU-{id}"),
        location: location.to_string(),
        description: String::new(),
        company_name: company.to_string(),
        technology: tech.to_string(),
        auction_name: auction.to_string(),
        delivery_year: String::new(),
        status: String::new(),
        component_type: String::new(),
        derated_capacity_mw: None,
        county: None,
        outward_code: None,
        latitude: None,
        longitude: None,
        raw: BTreeMap::new(),
    }
}

pub fn built_store(components: &[Component]) -> ComponentStore {
    let mut store = ComponentStore::open_in_memory().expect("store");
    store.upsert_batch(components).expect("seed");
    build_aggregates(&mut store, &tokens(), &AggregateOptions::default()).expect("build");
    store
}

pub fn all_groups(store: &ComponentStore) -> Vec<StoredGroup> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM location_groups ORDER BY id");
    let mut stmt = store.connection().prepare(&sql).expect("prepare");
    let rows = stmt.query_map([], decode_group_row).expect("query");
    rows.collect::<Result<Vec<_>, _>>().expect("decode")
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Application-loop filter: reads every group and recomputes the active flag
/// from its auction years.
pub fn app_loop_filter(
    groups: &[StoredGroup],
    req: &SearchRequest,
    tokens: &ActiveYearTokens,
) -> BTreeSet<i64> {
    groups
        .iter()
        .filter(|stored| {
            let g = &stored.group;
            let token_ok = req.tokens().iter().all(|t| {
                contains_ci(&g.location, t)
                    || g.companies.keys().any(|k| contains_ci(k, t))
                    || g.descriptions.iter().any(|d| contains_ci(d, t))
                    || g.cmu_ids.iter().any(|c| contains_ci(c, t))
                    || g.technologies.keys().any(|k| contains_ci(k, t))
            });
            let active = tokens.is_active(&g.auction_years);
            let status_ok = match req.status {
                StatusFilter::All => true,
                StatusFilter::Active => active,
                StatusFilter::Inactive => !active,
            };
            let auction_ok = req
                .auction
                .as_deref()
                .map_or(true, |a| g.auction_years.iter().any(|y| contains_ci(y, a)));
            let tech_ok = req
                .technology
                .as_deref()
                .map_or(true, |t| g.technologies.contains_key(t));
            let company_ok = req
                .company
                .as_deref()
                .map_or(true, |c| g.companies.contains_key(c));
            token_ok && status_ok && auction_ok && tech_ok && company_ok
        })
        .map(|stored| stored.id)
        .collect()
}
