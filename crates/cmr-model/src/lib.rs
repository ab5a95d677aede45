// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Capacity market domain model.
//!
//! Plain data plus the pure functions whose results are persisted: location
//! normalization, facet tallies, the active-year predicate and technology
//! priority. Nothing here touches the network or the database.

mod active;
mod artifacts;
mod company;
mod component;
mod freshness;
mod group;
mod location;
mod serde_helpers;
mod technology;

pub use active::{has_year_token, ActiveYearTokens};
pub use artifacts::{
    ComponentSummary, LocationComponents, LocationPoint, StaticIndex, StaticIndexStats,
    INDEX_FILE, LOCATION_COMPONENTS_FILE, LOCATION_COORDINATES_FILE, MAX_COMPONENTS_PER_LOCATION,
    OUTWARD_LOCATIONS_FILE, TRIGRAM_LOCATIONS_FILE,
};
pub use company::{company_search_link, encode_query_component, AuctionLink, CompanyLinks};
pub use component::{
    CmuRegistryEntry, Component, RecordError, UpstreamRecord, CMU_ID_FIELD, COMPONENT_ID_FIELD,
};
pub use freshness::{
    FreshnessBaseline, FreshnessDecision, HistoryEntry, BASELINE_VERSION, HISTORY_LIMIT,
};
pub use group::{
    sql_trim, trim_field, CapacityConfidence, FacetCounts, LocationGroup, CAPACITY_SOURCE_DERATED,
    FIELD_WHITESPACE, MAX_AUCTION_YEARS, MAX_DESCRIPTIONS, UNKNOWN_FACET,
};
pub use location::{is_excluded_location, normalize_location};
pub use technology::{primary_company, primary_technology, technology_priority};

pub const CRATE_NAME: &str = "cmr-model";
