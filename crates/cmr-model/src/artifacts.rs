// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OUTWARD_LOCATIONS_FILE: &str = "outward_locations.json";
pub const LOCATION_COORDINATES_FILE: &str = "location_coordinates.json";
pub const TRIGRAM_LOCATIONS_FILE: &str = "trigram_locations.json";
pub const LOCATION_COMPONENTS_FILE: &str = "location_components.json";
pub const INDEX_FILE: &str = "index.json";

pub const MAX_COMPONENTS_PER_LOCATION: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub component_id: String,
    pub cmu_id: String,
    pub company_name: String,
    pub technology: String,
    pub auction_name: String,
    pub derated_capacity_mw: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationComponents {
    pub count: u64,
    pub components: Vec<ComponentSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIndexStats {
    pub outward_codes: u64,
    pub locations_with_coordinates: u64,
    pub trigram_terms: u64,
    pub locations: u64,
    pub components: u64,
}

/// Manifest written last so a reader can tell a complete artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIndex {
    pub generated_at: String,
    pub files: BTreeMap<String, String>,
    pub stats: StaticIndexStats,
}
