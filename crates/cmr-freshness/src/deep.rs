// SPDX-License-Identifier: Apache-2.0

use cmr_ingest::{DatastoreQuery, UpstreamApi};
use cmr_model::Component;
use cmr_store::ComponentStore;
use serde::Serialize;
use tracing::{debug, warn};

use crate::totals::DELIVERY_YEAR_FIELD;
use crate::FreshnessError;

pub const DEFAULT_SAMPLE_SIZE: u64 = 5;
const CAPACITY_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSample {
    pub year: String,
    pub attempted: u64,
    pub found_new: u64,
    pub found_updated: u64,
    /// Component ids of new or changed rows.
    pub changed_ids: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeepCheckReport {
    pub sample_size: u64,
    pub years: Vec<YearSample>,
    pub total_new: u64,
    pub total_updated: u64,
}

impl DeepCheckReport {
    #[must_use]
    pub fn found_changes(&self) -> bool {
        self.total_new + self.total_updated > 0
    }
}

/// Fetch up to `sample_size` rows per focus year and compare them with the
/// store. A row is new when no local component shares its CMU, auction and
/// delivery year; it is updated when technology or capacity differ.
pub fn deep_check(
    api: &dyn UpstreamApi,
    store: &ComponentStore,
    resource_id: &str,
    focus_years: &[String],
    sample_size: u64,
) -> Result<DeepCheckReport, FreshnessError> {
    let mut report = DeepCheckReport {
        sample_size,
        ..DeepCheckReport::default()
    };
    for year in focus_years {
        let mut sample = YearSample {
            year: year.clone(),
            attempted: 0,
            found_new: 0,
            found_updated: 0,
            changed_ids: Vec::new(),
            error: None,
        };
        let query = DatastoreQuery::page(resource_id, sample_size, 0).with_filter(DELIVERY_YEAR_FIELD, year);
        let page = match api.datastore_search(&query) {
            Ok(page) => page,
            Err(e) => {
                warn!(year = %year, error = %e, "deep check sample failed");
                sample.error = Some(e.to_string());
                report.years.push(sample);
                continue;
            }
        };
        for record in &page.records {
            let Ok(upstream) = Component::from_upstream(record) else {
                continue;
            };
            sample.attempted += 1;
            let local = store.bulk_by_cmu(&upstream.cmu_id)?.into_iter().find(|c| {
                c.auction_name == upstream.auction_name && c.delivery_year == upstream.delivery_year
            });
            match local {
                None => {
                    sample.found_new += 1;
                    sample.changed_ids.push(upstream.component_id.clone());
                }
                Some(local) if differs(&local, &upstream) => {
                    sample.found_updated += 1;
                    sample.changed_ids.push(upstream.component_id.clone());
                }
                Some(_) => {}
            }
        }
        debug!(year = %year, attempted = sample.attempted, new = sample.found_new, updated = sample.found_updated, "deep check sample");
        report.total_new += sample.found_new;
        report.total_updated += sample.found_updated;
        report.years.push(sample);
    }
    Ok(report)
}

fn differs(local: &Component, upstream: &Component) -> bool {
    if local.technology != upstream.technology {
        return true;
    }
    match (local.derated_capacity_mw, upstream.derated_capacity_mw) {
        (Some(a), Some(b)) => (a - b).abs() > CAPACITY_EPSILON,
        (None, None) => false,
        _ => true,
    }
}
