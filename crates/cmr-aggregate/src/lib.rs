// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Materializes location groups and company links from the component store,
//! reports the activation gate, and writes the static lookup artifacts.

use std::fmt::{Display, Formatter};

mod artifacts;
mod builder;
mod fast;
mod gate;
mod group;
mod links;

pub use artifacts::{generate_static_artifacts, trigram_terms, TRIGRAM_MAX_LOCATIONS};
pub use builder::{
    build_aggregates, AggregateOptions, AggregateReport, BuildMode, FailedBatch,
    DEFAULT_BATCH_SIZE,
};
pub use fast::aggregate_location_sql;
pub use gate::{gate_report, GateReport};
pub use group::{build_location_group, unrecognized_auction_labels};
pub use links::{build_company_links, CompanyLinksReport, COMPANY_BATCH_SIZE};

pub const CRATE_NAME: &str = "cmr-aggregate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AggregateErrorCode {
    Store,
    Invariant,
    Io,
}

impl AggregateErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store_error",
            Self::Invariant => "invariant_violation",
            Self::Io => "io_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    pub code: AggregateErrorCode,
    pub message: String,
}

impl AggregateError {
    #[must_use]
    pub fn new(code: AggregateErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for AggregateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AggregateError {}

impl From<cmr_store::StoreError> for AggregateError {
    fn from(e: cmr_store::StoreError) -> Self {
        Self::new(AggregateErrorCode::Store, e.to_string())
    }
}

impl From<rusqlite::Error> for AggregateError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(AggregateErrorCode::Store, e.to_string())
    }
}
