// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Canonical row store for capacity-market components.
//!
//! The store owns the SQLite schema for every persisted table: components, the
//! CMU registry, materialized location groups, company links, crawl offsets
//! and a small key/value meta table. Batch jobs in other crates write through
//! the helpers here so the column layout lives in one place.

use std::fmt::{Display, Formatter};

mod components;
mod groups;
mod links;
mod lock;
mod maintenance;
mod registry;
mod schema;

pub use components::{
    ComponentStore, LocationFilter, UpsertCounts, UpsertOutcome, AdminFields,
    EXCLUDED_LOCATION_SQL,
};
pub use groups::{
    count_location_groups, decode_group_row, delete_all_location_groups, read_location_group,
    read_location_group_by_location, upsert_location_group, StoredGroup, GROUP_COLUMNS,
};
pub use links::{read_company_links, upsert_company_links};
pub use lock::RunLock;
pub use maintenance::{NormalizeReport, RepairReport};
pub use registry::CrawlState;
pub use schema::{ensure_schema, SCHEMA_VERSION};

pub const CRATE_NAME: &str = "cmr-store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorCode {
    Sqlite,
    Schema,
    Decode,
    Io,
    Locked,
    NotFound,
}

impl StoreErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite_error",
            Self::Schema => "schema_incompatible",
            Self::Decode => "decode_error",
            Self::Io => "io_error",
            Self::Locked => "run_locked",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(StoreErrorCode::Sqlite, e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(StoreErrorCode::Decode, e.to_string())
    }
}
