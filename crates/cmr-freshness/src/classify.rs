// SPDX-License-Identifier: Apache-2.0

use cmr_model::FreshnessDecision;
use serde::Serialize;

use crate::totals::{year_start, LocalTotals, UpstreamTotals};

pub const DEFAULT_TOLERANCE: u64 = 100;
pub const DEFAULT_CONCENTRATION: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// Absolute record difference still treated as equal.
    pub tolerance: u64,
    /// Share of the positive per-year delta that must fall in known years
    /// for a gap to count as duplication.
    pub concentration: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            concentration: DEFAULT_CONCENTRATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub decision: FreshnessDecision,
    /// `upstream - local`.
    pub delta: i64,
    pub new_years: Vec<String>,
    /// Fraction of the positive per-year delta in years the store already holds.
    pub known_year_share: Option<f64>,
    pub reason: String,
}

/// Deterministic decision over local and upstream totals.
///
/// Precedence: a delivery year past the local maximum with upstream records
/// wins; then a local surplus; then equality within tolerance; a remaining
/// shortfall is duplication when it sits in known years, an update otherwise.
#[must_use]
pub fn classify(local: &LocalTotals, upstream: &UpstreamTotals, thresholds: &Thresholds) -> Classification {
    let delta = upstream.components as i64 - local.components as i64;
    let tolerance = thresholds.tolerance as i64;

    let new_years = new_years(local, upstream);
    if !new_years.is_empty() {
        return Classification {
            decision: FreshnessDecision::NewAuction,
            delta,
            reason: format!("upstream has records for delivery years {}", new_years.join(", ")),
            new_years,
            known_year_share: None,
        };
    }

    if delta < -tolerance {
        return Classification {
            decision: FreshnessDecision::Investigate,
            delta,
            new_years,
            known_year_share: None,
            reason: format!("local store holds {} more records than upstream", -delta),
        };
    }

    if delta <= tolerance {
        return Classification {
            decision: FreshnessDecision::Current,
            delta,
            new_years,
            known_year_share: None,
            reason: format!("difference of {delta} is within tolerance {tolerance}"),
        };
    }

    let share = known_year_share(local, upstream);
    let concentrated = share.map_or(true, |s| s >= thresholds.concentration);
    let (decision, reason) = if concentrated {
        (
            FreshnessDecision::DuplicateArtifact,
            format!("upstream exceeds local by {delta}, concentrated in known delivery years"),
        )
    } else {
        (
            FreshnessDecision::Update,
            format!("upstream exceeds local by {delta} outside known delivery years"),
        )
    };
    Classification {
        decision,
        delta,
        new_years,
        known_year_share: share,
        reason,
    }
}

fn new_years(local: &LocalTotals, upstream: &UpstreamTotals) -> Vec<String> {
    let Some(max) = local.max_year().and_then(year_start) else {
        return Vec::new();
    };
    let Some(per_year) = &upstream.year_counts else {
        return Vec::new();
    };
    per_year
        .iter()
        .filter(|(label, count)| **count > 0 && year_start(label).is_some_and(|y| y > max))
        .map(|(label, _)| label.clone())
        .collect()
}

fn known_year_share(local: &LocalTotals, upstream: &UpstreamTotals) -> Option<f64> {
    let per_year = upstream.year_counts.as_ref()?;
    let mut known = 0_u64;
    let mut total = 0_u64;
    for (year, upstream_count) in per_year {
        let local_count = local.year_counts.get(year).copied().unwrap_or(0);
        let gap = upstream_count.saturating_sub(local_count);
        total += gap;
        if local.year_counts.contains_key(year) {
            known += gap;
        }
    }
    (total > 0).then(|| known as f64 / total as f64)
}
