// SPDX-License-Identifier: Apache-2.0

use cmr_aggregate::{
    build_aggregates, build_company_links, gate_report, generate_static_artifacts,
    AggregateOptions, BuildMode,
};
use cmr_model::{
    ActiveYearTokens, Component, LocationComponents, StaticIndex, INDEX_FILE,
    LOCATION_COMPONENTS_FILE, OUTWARD_LOCATIONS_FILE,
};
use cmr_store::{read_company_links, read_location_group_by_location, ComponentStore};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn tokens() -> ActiveYearTokens {
    ActiveYearTokens::new(vec!["2024-25".to_string(), "2025-26".to_string()])
}

fn component(id: &str, location: &str, tech: &str, company: &str, auction: &str) -> Component {
    Component {
        component_id: id.to_string(),
        cmu_id: format!("CMU-{id}"),
        location: location.to_string(),
        description: format!("Unit {id}"),
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

fn imperial_store() -> ComponentStore {
    let mut store = ComponentStore::open_in_memory().expect("store");
    store
        .upsert_batch(&[
            component("1", "Imperial College London", "Gas", "A", "T-4 2024-25"),
            component("2", "Imperial College London", "Gas", "A", "T-1 2022-23"),
            component("3", "Imperial College London", "Battery", "B", "T-4 2024-25"),
            component("4", "TBC", "Gas", "A", "T-4 2024-25"),
        ])
        .expect("seed");
    store
}

#[test]
fn imperial_college_group_is_materialized() {
    let mut store = imperial_store();
    let report = build_aggregates(&mut store, &tokens(), &AggregateOptions::default()).expect("build");
    assert_eq!(report.groups_created, 1);
    assert!(report.failed_batches.is_empty());
    let stored = read_location_group_by_location(store.connection(), "Imperial College London")
        .expect("read")
        .expect("group");
    let g = stored.group;
    assert_eq!(g.component_count, 3);
    assert_eq!(serde_json::to_string(&g.technologies).expect("json"), r#"{"Gas":2,"Battery":1}"#);
    assert_eq!(serde_json::to_string(&g.companies).expect("json"), r#"{"A":2,"B":1}"#);
    assert_eq!(g.auction_years, vec!["T-4 2024-25", "T-1 2022-23"]);
    assert!(g.is_active);

    // placeholder location is outside both numerator and denominator
    assert_eq!(report.gate.total_components, 3);
    assert_eq!(report.gate.covered_components, 3);
    assert!(report.gate.is_authoritative);
}

#[test]
fn rebuild_is_idempotent_and_keeps_ids() {
    let mut store = imperial_store();
    build_aggregates(&mut store, &tokens(), &AggregateOptions::default()).expect("first");
    let first = read_location_group_by_location(store.connection(), "Imperial College London")
        .expect("read")
        .expect("group");
    let again = build_aggregates(&mut store, &tokens(), &AggregateOptions::default()).expect("second");
    assert_eq!(again.groups_created, 0);
    assert_eq!(again.groups_updated, 1);
    let second = read_location_group_by_location(store.connection(), "Imperial College London")
        .expect("read")
        .expect("group");
    assert_eq!(first, second);

    let full = build_aggregates(
        &mut store,
        &tokens(),
        &AggregateOptions {
            full_rebuild: true,
            ..AggregateOptions::default()
        },
    )
    .expect("full");
    assert_eq!(full.groups_created, 1);
}

#[test]
fn batches_are_resumable_in_location_order() {
    let mut store = ComponentStore::open_in_memory().expect("store");
    let batch: Vec<Component> = (0..25)
        .map(|i| component(&i.to_string(), &format!("Site {i:02}"), "Solar", "Acme", "T-4 2024-25"))
        .collect();
    store.upsert_batch(&batch).expect("seed");

    let partial = build_aggregates(
        &mut store,
        &tokens(),
        &AggregateOptions {
            batch_size: 10,
            max_locations: Some(12),
            ..AggregateOptions::default()
        },
    )
    .expect("partial");
    assert_eq!(partial.locations_seen, 12);
    assert_eq!(partial.batches, 2);
    assert_eq!(partial.last_location.as_deref(), Some("Site 11"));
    assert!(!partial.gate.is_authoritative);

    let rest = build_aggregates(
        &mut store,
        &tokens(),
        &AggregateOptions {
            batch_size: 10,
            resume_after: partial.last_location.clone(),
            ..AggregateOptions::default()
        },
    )
    .expect("rest");
    assert_eq!(rest.locations_seen, 13);
    assert_eq!(rest.groups_created, 13);
    assert_eq!(rest.gate.covered_components, 25);
    assert!(rest.gate.is_authoritative);
}

#[test]
fn gate_is_closed_below_threshold() {
    let mut store = imperial_store();
    let gate = gate_report(store.connection(), 0.8).expect("gate");
    assert_eq!(gate.groups, 0);
    assert!(!gate.is_authoritative);
    build_aggregates(&mut store, &tokens(), &AggregateOptions::default()).expect("build");
    store
        .upsert(&component("9", "Somewhere New", "Wind", "C", "T-4 2024-25"))
        .expect("late arrival");
    let gate = gate_report(store.connection(), 0.8).expect("gate");
    assert_eq!(gate.covered_components, 3);
    assert_eq!(gate.total_components, 4);
    assert!((gate.coverage - 0.75).abs() < 1e-9);
    assert!(!gate.is_authoritative);
}

#[test]
fn company_links_are_grouped_by_auction() {
    let mut store = imperial_store();
    let report = build_company_links(&mut store, true).expect("links");
    assert_eq!(report.companies, 2);
    let links = read_company_links(store.connection(), "A")
        .expect("read")
        .expect("links");
    assert_eq!(links.component_count, 3);
    assert_eq!(links.auction_count, 2);
    assert_eq!(links.auction_links[0].auction, "T-4 2024-25");
    assert_eq!(links.auction_links[0].count, 2);
    assert_eq!(links.auction_links[0].url, "/search/?company=A&auction=T-4%202024-25");
}

#[test]
fn static_artifacts_are_written_with_index_last() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = imperial_store();
    let mut sited = component("5", "Asda Battersea, SW11 5BP", "Battery", "Asda", "T-4 2024-25");
    sited.outward_code = Some("SW11".to_string());
    sited.latitude = Some(51.46);
    sited.longitude = Some(-0.16);
    store.upsert(&sited).expect("sited");

    let index = generate_static_artifacts(&store, dir.path()).expect("artifacts");
    assert_eq!(index.stats.components, 4);
    assert_eq!(index.stats.outward_codes, 1);
    assert_eq!(index.stats.locations_with_coordinates, 1);

    let outward: BTreeMap<String, Vec<String>> = serde_json::from_slice(
        &std::fs::read(dir.path().join(OUTWARD_LOCATIONS_FILE)).expect("read"),
    )
    .expect("json");
    assert_eq!(outward["SW11"], vec!["Asda Battersea, SW11 5BP"]);
    let per_location: BTreeMap<String, LocationComponents> = serde_json::from_slice(
        &std::fs::read(dir.path().join(LOCATION_COMPONENTS_FILE)).expect("read"),
    )
    .expect("json");
    assert_eq!(per_location["Imperial College London"].count, 3);
    assert!(!per_location.contains_key("TBC"));
    let on_disk: StaticIndex =
        serde_json::from_slice(&std::fs::read(dir.path().join(INDEX_FILE)).expect("read")).expect("json");
    assert_eq!(on_disk, index);
}

#[test]
fn control_whitespace_is_trimmed_the_same_on_both_paths() {
    let mut rows = vec![
        component("1", "Drax", "\tBiomass", "Drax\r\n", "\nT-4 2024-25 "),
        component("2", "Drax", "Biomass", "Drax", "T-4 2024-25"),
    ];
    rows[0].description = "\tBoiler house\n".to_string();
    rows[0].cmu_id = " CMU-DRAX\t".to_string();
    rows[1].description = "Boiler house".to_string();
    rows[1].cmu_id = "CMU-DRAX".to_string();

    let mut standard = ComponentStore::open_in_memory().expect("store");
    let mut fast = ComponentStore::open_in_memory().expect("store");
    standard.upsert_batch(&rows).expect("seed");
    fast.upsert_batch(&rows).expect("seed");
    build_aggregates(&mut standard, &tokens(), &AggregateOptions::default()).expect("standard");
    build_aggregates(
        &mut fast,
        &tokens(),
        &AggregateOptions { mode: BuildMode::Fast, ..AggregateOptions::default() },
    )
    .expect("fast");

    let a = read_location_group_by_location(standard.connection(), "Drax")
        .expect("read")
        .expect("group")
        .group;
    let b = read_location_group_by_location(fast.connection(), "Drax")
        .expect("read")
        .expect("group")
        .group;
    assert_eq!(a, b);
    assert_eq!(a.descriptions, vec!["Boiler house"]);
    assert_eq!(a.technologies.get("Biomass"), Some(2));
    assert_eq!(a.companies.get("Drax"), Some(2));
    assert_eq!(a.auction_years, vec!["T-4 2024-25"]);
    assert_eq!(a.cmu_ids, vec!["CMU-DRAX"]);
}

const TECHS: [&str; 5] = ["Gas", "Battery", "", "Solar", "Unknown"];
const COMPANIES: [&str; 4] = ["A", "B", "", "C"];
const AUCTIONS: [&str; 8] = [
    "T-4 2024-25",
    "T-1 2022-23",
    "T-4 2019-20",
    "T-3 2025-26",
    "T-4 2018-19",
    "T-4 2020-21",
    "",
    "Early Auction",
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn fast_path_matches_standard_path_and_invariants_hold(
        rows in proptest::collection::vec(
            (0usize..4, 0usize..5, 0usize..4, 0usize..8, proptest::option::of(0u8..20), 0usize..3),
            1..40,
        )
    ) {
        let mut standard = ComponentStore::open_in_memory().expect("store");
        let mut fast = ComponentStore::open_in_memory().expect("store");
        let components: Vec<Component> = rows
            .iter()
            .enumerate()
            .map(|(i, (loc, tech, company, auction, capacity, desc))| {
                let mut c = component(
                    &format!("C{i:03}"),
                    &format!("Location {loc}"),
                    TECHS[*tech],
                    COMPANIES[*company],
                    AUCTIONS[*auction],
                );
                c.cmu_id = format!("CMU{}", i % 3);
                c.description = ["", "Engine", "\tBattery hall\n"][*desc].to_string();
                c.derated_capacity_mw = capacity.map(|v| f64::from(v) * 0.5);
                if i % 4 == 1 {
                    c.latitude = Some(50.0 + i as f64);
                    c.longitude = Some(-1.0);
                }
                c
            })
            .collect();
        standard.upsert_batch(&components).expect("seed");
        fast.upsert_batch(&components).expect("seed");

        build_aggregates(&mut standard, &tokens(), &AggregateOptions::default()).expect("standard");
        build_aggregates(
            &mut fast,
            &tokens(),
            &AggregateOptions { mode: BuildMode::Fast, ..AggregateOptions::default() },
        )
        .expect("fast");

        let locations: BTreeSet<String> = components.iter().map(|c| c.location.clone()).collect();
        for location in locations {
            let a = read_location_group_by_location(standard.connection(), &location)
                .expect("read")
                .expect("standard group")
                .group;
            let b = read_location_group_by_location(fast.connection(), &location)
                .expect("read")
                .expect("fast group")
                .group;
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.technologies.total(), a.component_count);
            prop_assert_eq!(a.companies.total(), a.component_count);
            prop_assert!(a.technologies.keys().chain(a.companies.keys()).all(|k| !k.is_empty()));
            let recomputed = a
                .auction_years
                .iter()
                .any(|y| tokens().tokens().iter().any(|t| y.contains(t.as_str())));
            prop_assert_eq!(a.is_active, recomputed);
        }
    }
}
