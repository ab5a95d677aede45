// SPDX-License-Identifier: Apache-2.0

use cmr_aggregate::{build_aggregates, build_location_group, AggregateOptions, BuildMode};
use cmr_model::{ActiveYearTokens, Component};
use cmr_store::ComponentStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;

const TECHS: [&str; 4] = ["Gas", "Battery", "Solar", "Wind"];

fn synthetic(n: usize, locations: usize) -> Vec<Component> {
    (0..n)
        .map(|i| Component {
            component_id: format!("C{i:06}"),
            cmu_id: format!("CMU{}", i % 997),
            location: format!("Site {} AB{} 1CD", i % locations, i % 50),
            description: format!("Unit {}", i % 7),
            company_name: format!("Company {}", i % 113),
            technology: TECHS[i % TECHS.len()].to_string(),
            auction_name: format!("T-4 20{}-{}", 15 + i % 10, 16 + i % 10),
            delivery_year: String::new(),
            status: String::new(),
            component_type: String::new(),
            derated_capacity_mw: (i % 3 != 0).then_some(1.25),
            county: None,
            outward_code: None,
            latitude: None,
            longitude: None,
            raw: BTreeMap::new(),
        })
        .collect()
}

fn tokens() -> ActiveYearTokens {
    ActiveYearTokens::new(vec!["2024-25".to_string(), "2025-26".to_string()])
}

fn bench_group_function(c: &mut Criterion) {
    let components = synthetic(200, 1);
    let tokens = tokens();
    c.bench_function("aggregate.group.200_components", |b| {
        b.iter(|| build_location_group(black_box("Site 0"), black_box(&components), &tokens));
    });
}

fn bench_full_build(c: &mut Criterion) {
    let mut store = ComponentStore::open_in_memory().expect("store");
    store.upsert_batch(&synthetic(5_000, 1_200)).expect("seed");
    let tokens = tokens();
    for mode in [BuildMode::Standard, BuildMode::Fast] {
        let opts = AggregateOptions {
            mode,
            full_rebuild: true,
            ..AggregateOptions::default()
        };
        c.bench_function(&format!("aggregate.build.{mode:?}.5k"), |b| {
            b.iter(|| build_aggregates(&mut store, &tokens, &opts).expect("build"));
        });
    }
}

criterion_group!(benches, bench_group_function, bench_full_build);
criterion_main!(benches);
