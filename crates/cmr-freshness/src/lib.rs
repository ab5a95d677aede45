// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Freshness monitor.
//!
//! Compares local totals with the upstream datastore, classifies the gap,
//! keeps a baseline snapshot plus a rolling run history on disk, and raises
//! alerts when new auction data appears or the local store holds more than the
//! upstream.

use std::fmt::{Display, Formatter};

mod alert;
mod check;
mod classify;
mod deep;
mod files;
mod totals;

pub use alert::{
    alert_subject, AlertDeltas, AlertSink, LogSink, MailgunSink, DEFAULT_LARGE_DELTA,
    ENV_ADMIN_EMAIL, ENV_FROM_EMAIL, ENV_LARGE_DELTA, ENV_MAILGUN_API_KEY, ENV_MAILGUN_DOMAIN,
    SUBJECT_INVESTIGATE, SUBJECT_LARGE_CHANGE, SUBJECT_NEW_AUCTION, SUBJECT_WEEKLY,
};
pub use check::{check_freshness, data_age_days, FreshnessOptions, FreshnessReport, STALE_AFTER_DAYS};
pub use classify::{classify, Classification, Thresholds, DEFAULT_CONCENTRATION, DEFAULT_TOLERANCE};
pub use deep::{deep_check, DeepCheckReport, YearSample, DEFAULT_SAMPLE_SIZE};
pub use files::{StateFiles, BASELINE_FILE, HISTORY_FILE};
pub use totals::{
    local_totals, next_year_label, probe_years, upstream_totals, year_start, LocalTotals,
    UpstreamTotals, DELIVERY_YEAR_FIELD,
};

pub const CRATE_NAME: &str = "cmr-freshness";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FreshnessErrorCode {
    Store,
    Upstream,
    Io,
    Decode,
    Alert,
}

impl FreshnessErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store_error",
            Self::Upstream => "upstream_unavailable",
            Self::Io => "io_error",
            Self::Decode => "decode_error",
            Self::Alert => "alert_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessError {
    pub code: FreshnessErrorCode,
    pub message: String,
}

impl FreshnessError {
    #[must_use]
    pub fn new(code: FreshnessErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for FreshnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for FreshnessError {}

impl From<cmr_store::StoreError> for FreshnessError {
    fn from(e: cmr_store::StoreError) -> Self {
        Self::new(FreshnessErrorCode::Store, e.to_string())
    }
}

impl From<cmr_ingest::IngestError> for FreshnessError {
    fn from(e: cmr_ingest::IngestError) -> Self {
        Self::new(FreshnessErrorCode::Upstream, e.to_string())
    }
}
