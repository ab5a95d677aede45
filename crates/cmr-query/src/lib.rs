// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Search and lookups over materialized location groups.
//!
//! Every filter is composed as a database predicate over the JSON facet
//! columns; a list page costs one row query and one count/sum query. While
//! the aggregate is below its activation threshold the same request is
//! answered from raw components instead.

use std::fmt::{Display, Formatter};

mod detail;
mod filter;
mod map;
mod outcodes;
mod projection;
mod request;
mod search;
mod suggest;

pub use detail::{component_raw, location_detail, LocationDetail, RawComponent};
pub use filter::{
    component_order, component_predicate, escape_like, group_order, group_predicate, Predicate,
};
pub use map::{
    map_features, Feature, FeatureCollection, MapProperties, PointGeometry, MAX_MAP_FEATURES,
};
pub use outcodes::{outward_locations_from_db, OutcodeIndex, StaticOutcodeIndex};
pub use projection::{compile_projection, decode_group_view_row, GroupRow, Projection, View};
pub use request::{
    normalize_query, snap_per_page, SearchParams, SearchRequest, SortBy, SortOrder,
    StatusFilter, DEFAULT_PER_PAGE, MAX_QUERY_LEN, PAGE_SIZES,
};
pub use search::{
    search, search_components, search_groups, PostcodeFallback, ResultSource, SearchContext,
    SearchPage,
};
pub use suggest::{company_suggestions, CompanySuggestion, DEFAULT_SUGGESTION_LIMIT};

pub const CRATE_NAME: &str = "cmr-query";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryErrorCode {
    Sql,
    Store,
    Decode,
    Io,
}

impl QueryErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql_error",
            Self::Store => "store_error",
            Self::Decode => "decode_error",
            Self::Io => "io_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    pub code: QueryErrorCode,
    pub message: String,
}

impl QueryError {
    #[must_use]
    pub fn new(code: QueryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for QueryError {}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(QueryErrorCode::Sql, e.to_string())
    }
}

impl From<cmr_store::StoreError> for QueryError {
    fn from(e: cmr_store::StoreError) -> Self {
        Self::new(QueryErrorCode::Store, e.to_string())
    }
}
