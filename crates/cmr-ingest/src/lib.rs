// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Pulls the upstream open-data datastore into the component store.
//!
//! Pages are fetched by `(resource_id, limit, offset)`; the furthest offset
//! reached is persisted after every page so an interrupted crawl resumes where
//! it stopped. Transient upstream failures back off exponentially.

use std::fmt::{Display, Formatter};

mod backoff;
mod crawler;
mod upstream;

pub use backoff::{Backoff, Sleeper, ThreadSleeper, MAX_BACKOFF};
pub use crawler::{
    crawl_cmu_registry, crawl_components, CrawlOptions, CrawlReport, MalformedSample, Resource,
    DEFAULT_MAX_RETRIES, DEFAULT_PAGE_LIMIT,
};
pub use upstream::{
    parse_envelope, DatastorePage, DatastoreQuery, HttpUpstream, UpstreamApi,
    CMU_RESOURCE_ID, COMPONENT_RESOURCE_ID, DEFAULT_UPSTREAM_API, UPSTREAM_HTTP_TIMEOUT,
};

pub const CRATE_NAME: &str = "cmr-ingest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestErrorCode {
    /// Connection, timeout, 429 or 5xx. Worth retrying.
    Network,
    /// The upstream answered but refused or returned an unusable envelope.
    Upstream,
    Store,
}

impl IngestErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "upstream_unavailable",
            Self::Upstream => "upstream_rejected",
            Self::Store => "store_error",
        }
    }

    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub code: IngestErrorCode,
    pub message: String,
}

impl IngestError {
    #[must_use]
    pub fn new(code: IngestErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for IngestError {}

impl From<cmr_store::StoreError> for IngestError {
    fn from(e: cmr_store::StoreError) -> Self {
        Self::new(IngestErrorCode::Store, e.to_string())
    }
}
