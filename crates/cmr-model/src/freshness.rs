// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub const BASELINE_VERSION: &str = "2";
pub const HISTORY_LIMIT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessDecision {
    Current,
    Update,
    DuplicateArtifact,
    NewAuction,
    Investigate,
}

impl FreshnessDecision {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Update => "update",
            Self::DuplicateArtifact => "duplicate_artifact",
            Self::NewAuction => "new_auction",
            Self::Investigate => "investigate",
        }
    }

    #[must_use]
    pub const fn requires_alert(self) -> bool {
        matches!(self, Self::NewAuction | Self::Investigate)
    }
}

impl Display for FreshnessDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known-good snapshot used as the week-over-week reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessBaseline {
    pub created_date: String,
    pub components_count: u64,
    pub cmu_count: u64,
    #[serde(default)]
    pub year_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub auction_counts: BTreeMap<String, u64>,
    pub api_total_at_baseline: Option<u64>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub components_count: u64,
    pub cmu_count: u64,
    pub decision: FreshnessDecision,
    #[serde(default)]
    pub new_years: Vec<String>,
    pub data_age_days: i64,
    pub recommendation: String,
}
