// SPDX-License-Identifier: Apache-2.0

use cmr_model::{
    ComponentSummary, LocationComponents, LocationPoint, StaticIndex, StaticIndexStats,
    INDEX_FILE, LOCATION_COMPONENTS_FILE, LOCATION_COORDINATES_FILE, MAX_COMPONENTS_PER_LOCATION,
    OUTWARD_LOCATIONS_FILE, TRIGRAM_LOCATIONS_FILE,
};
use cmr_store::{ComponentStore, EXCLUDED_LOCATION_SQL};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

use crate::{AggregateError, AggregateErrorCode};

/// Terms shared by this many locations carry no signal and are dropped.
pub const TRIGRAM_MAX_LOCATIONS: usize = 100;

/// Lowercase three-character prefixes of every word with at least three
/// alphanumeric characters.
#[must_use]
pub fn trigram_terms(location: &str) -> BTreeSet<String> {
    location
        .split(|c: char| !c.is_alphanumeric())
        .filter_map(|word| {
            let lowered: String = word.chars().flat_map(char::to_lowercase).collect();
            (lowered.chars().count() >= 3).then(|| lowered.chars().take(3).collect())
        })
        .collect()
}

/// Write the static lookup files from the component store into `out_dir`.
/// `index.json` is written last.
pub fn generate_static_artifacts(
    store: &ComponentStore,
    out_dir: &Path,
) -> Result<StaticIndex, AggregateError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| AggregateError::new(AggregateErrorCode::Io, e.to_string()))?;
    let conn = store.connection();

    let mut outward: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut coordinates: BTreeMap<String, LocationPoint> = BTreeMap::new();
    let mut trigrams: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut per_location: BTreeMap<String, LocationComponents> = BTreeMap::new();
    let mut components_total = 0_u64;

    let sql = format!(
        "SELECT location, outward_code, latitude, longitude, component_id, cmu_id,
                company_name, technology, auction_name, derated_capacity_mw
         FROM components WHERE NOT {EXCLUDED_LOCATION_SQL}
         ORDER BY location, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let location: String = row.get(0)?;
        let outward_code: Option<String> = row.get(1)?;
        let latitude: Option<f64> = row.get(2)?;
        let longitude: Option<f64> = row.get(3)?;
        components_total += 1;

        if let Some(code) = outward_code.filter(|c| !c.is_empty()) {
            outward.entry(code).or_default().insert(location.clone());
        }
        if let (Some(lat), Some(lng)) = (latitude, longitude) {
            coordinates
                .entry(location.clone())
                .or_insert(LocationPoint { lat, lng });
        }
        let entry = per_location
            .entry(location.clone())
            .or_insert_with(|| LocationComponents {
                count: 0,
                components: Vec::new(),
            });
        if entry.count == 0 {
            for term in trigram_terms(&location) {
                trigrams.entry(term).or_default().insert(location.clone());
            }
        }
        entry.count += 1;
        if entry.components.len() < MAX_COMPONENTS_PER_LOCATION {
            entry.components.push(ComponentSummary {
                component_id: row.get(4)?,
                cmu_id: row.get(5)?,
                company_name: row.get(6)?,
                technology: row.get(7)?,
                auction_name: row.get(8)?,
                derated_capacity_mw: row.get(9)?,
            });
        }
    }
    trigrams.retain(|_, locations| locations.len() < TRIGRAM_MAX_LOCATIONS);

    let stats = StaticIndexStats {
        outward_codes: outward.len() as u64,
        locations_with_coordinates: coordinates.len() as u64,
        trigram_terms: trigrams.len() as u64,
        locations: per_location.len() as u64,
        components: components_total,
    };

    let mut files = BTreeMap::new();
    files.insert(
        OUTWARD_LOCATIONS_FILE.to_string(),
        write_json(out_dir, OUTWARD_LOCATIONS_FILE, &outward)?,
    );
    files.insert(
        LOCATION_COORDINATES_FILE.to_string(),
        write_json(out_dir, LOCATION_COORDINATES_FILE, &coordinates)?,
    );
    files.insert(
        TRIGRAM_LOCATIONS_FILE.to_string(),
        write_json(out_dir, TRIGRAM_LOCATIONS_FILE, &trigrams)?,
    );
    files.insert(
        LOCATION_COMPONENTS_FILE.to_string(),
        write_json(out_dir, LOCATION_COMPONENTS_FILE, &per_location)?,
    );
    let index = StaticIndex {
        generated_at: chrono::Utc::now().to_rfc3339(),
        files,
        stats,
    };
    write_json(out_dir, INDEX_FILE, &index)?;
    info!(
        dir = %out_dir.display(),
        outward_codes = index.stats.outward_codes,
        locations = index.stats.locations,
        "static cache artifacts written"
    );
    Ok(index)
}

/// Returns the sha256 of the bytes written.
fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<String, AggregateError> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| AggregateError::new(AggregateErrorCode::Io, e.to_string()))?;
    cmr_core::write_atomic_file(&dir.join(name), &bytes)
        .map_err(|e| AggregateError::new(AggregateErrorCode::Io, e.to_string()))?;
    Ok(cmr_core::sha256_hex(&bytes))
}
