// SPDX-License-Identifier: Apache-2.0

use cmr_ingest::{DatastoreQuery, UpstreamApi};
use cmr_store::ComponentStore;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::FreshnessError;

pub const DELIVERY_YEAR_FIELD: &str = "Delivery Year";
const TOP_AUCTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LocalTotals {
    pub components: u64,
    pub cmus: u64,
    pub year_counts: BTreeMap<String, u64>,
    pub auction_counts: BTreeMap<String, u64>,
    pub latest_update: Option<String>,
}

impl LocalTotals {
    /// Delivery year label with the latest start year.
    #[must_use]
    pub fn max_year(&self) -> Option<&str> {
        self.year_counts
            .keys()
            .filter_map(|label| year_start(label).map(|start| (start, label)))
            .max_by_key(|(start, _)| *start)
            .map(|(_, label)| label.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UpstreamTotals {
    pub components: u64,
    /// Absent when the per-year probe was skipped or failed.
    pub year_counts: Option<BTreeMap<String, u64>>,
}

pub fn local_totals(store: &ComponentStore) -> Result<LocalTotals, FreshnessError> {
    Ok(LocalTotals {
        components: store.count_components()?,
        cmus: store.count_cmus()?,
        year_counts: store.year_counts()?,
        auction_counts: store.top_auction_counts(TOP_AUCTIONS)?.into_iter().collect(),
        latest_update: store.latest_update()?,
    })
}

/// First four-digit run in a delivery-year label (`2027`, `2027-28`, `2027/28`).
#[must_use]
pub fn year_start(label: &str) -> Option<i32> {
    let bytes = label.as_bytes();
    bytes
        .windows(4)
        .position(|w| w.iter().all(u8::is_ascii_digit))
        .and_then(|i| label.get(i..i + 4))
        .and_then(|digits| digits.parse().ok())
}

/// The label for the following year, in the same shape as `label`.
#[must_use]
pub fn next_year_label(label: &str) -> Option<String> {
    let start = year_start(label)?;
    let trimmed = label.trim();
    let next = start + 1;
    if trimmed.len() == 7 && (trimmed.as_bytes()[4] == b'-' || trimmed.as_bytes()[4] == b'/') {
        let sep = trimmed.as_bytes()[4] as char;
        return Some(format!("{next}{sep}{:02}", (next + 1) % 100));
    }
    if trimmed.len() == 4 {
        return Some(next.to_string());
    }
    None
}

/// Years worth asking the upstream about: every year the store knows, plus
/// `ahead` labels past the latest one.
#[must_use]
pub fn probe_years(local: &LocalTotals, ahead: usize) -> Vec<String> {
    let mut years: Vec<String> = local.year_counts.keys().cloned().collect();
    let mut cursor = local.max_year().map(str::to_string);
    for _ in 0..ahead {
        let Some(next) = cursor.as_deref().and_then(next_year_label) else {
            break;
        };
        years.push(next.clone());
        cursor = Some(next);
    }
    years
}

/// Upstream total (`limit=0`) plus, when `years` is non-empty, a filtered
/// total per delivery year.
pub fn upstream_totals(
    api: &dyn UpstreamApi,
    resource_id: &str,
    years: &[String],
) -> Result<UpstreamTotals, FreshnessError> {
    let total = api
        .datastore_search(&DatastoreQuery::total(resource_id))?
        .total
        .unwrap_or_default();
    if years.is_empty() {
        return Ok(UpstreamTotals {
            components: total,
            year_counts: None,
        });
    }
    let mut per_year = BTreeMap::new();
    for year in years {
        let query = DatastoreQuery::total(resource_id).with_filter(DELIVERY_YEAR_FIELD, year);
        match api.datastore_search(&query) {
            Ok(page) => {
                per_year.insert(year.clone(), page.total.unwrap_or_default());
            }
            Err(e) => {
                debug!(year = %year, error = %e, "per-year probe failed; falling back to total only");
                return Ok(UpstreamTotals {
                    components: total,
                    year_counts: None,
                });
            }
        }
    }
    Ok(UpstreamTotals {
        components: total,
        year_counts: Some(per_year),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_labels_step_forward_in_shape() {
        assert_eq!(year_start("2027-28"), Some(2027));
        assert_eq!(year_start("T-4 2024-25"), Some(2024));
        assert_eq!(year_start("n/a"), None);
        assert_eq!(next_year_label("2029-30").as_deref(), Some("2030-31"));
        assert_eq!(next_year_label("2099/00").as_deref(), Some("2100/01"));
        assert_eq!(next_year_label("2027").as_deref(), Some("2028"));
        assert_eq!(next_year_label("Delivery 2027"), None);
    }

    #[test]
    fn probe_years_extend_past_the_latest_known_year() {
        let local = LocalTotals {
            year_counts: [("2026-27".to_string(), 5), ("2028-29".to_string(), 2)].into(),
            ..LocalTotals::default()
        };
        assert_eq!(local.max_year(), Some("2028-29"));
        assert_eq!(
            probe_years(&local, 2),
            vec!["2026-27", "2028-29", "2029-30", "2030-31"]
        );
        assert!(probe_years(&LocalTotals::default(), 3).is_empty());
    }
}
