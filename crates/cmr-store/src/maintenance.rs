// SPDX-License-Identifier: Apache-2.0

use cmr_model::{normalize_location, CMU_ID_FIELD};
use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::{ComponentStore, StoreError};

const SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub scanned: u64,
    pub changed: u64,
    pub dry_run: bool,
    /// `(before, after)` pairs, first few only.
    pub samples: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub scanned: u64,
    pub cmu_ids_fixed: u64,
    pub companies_filled: u64,
    pub dry_run: bool,
    /// `(component_id, stored, from_raw)` for the first few repairs.
    pub samples: Vec<(String, String, String)>,
}

impl ComponentStore {
    /// Re-apply location normalization to every stored row. Already-normalized
    /// rows are left untouched. A dry run rolls the transaction back.
    pub fn normalize_locations(&mut self, dry_run: bool) -> Result<NormalizeReport, StoreError> {
        let tx = self.connection_mut().transaction()?;
        let mut report = NormalizeReport {
            dry_run,
            ..NormalizeReport::default()
        };
        {
            let mut select = tx.prepare("SELECT DISTINCT location FROM components")?;
            let locations = select
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut update = tx.prepare(
                "UPDATE components SET location = ?2,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE location = ?1",
            )?;
            for location in locations {
                let normalized = normalize_location(&location);
                report.scanned += 1;
                if normalized == location {
                    continue;
                }
                let rows = update.execute(params![location, normalized])?;
                report.changed += rows as u64;
                if report.samples.len() < SAMPLE_LIMIT {
                    report.samples.push((location, normalized));
                }
            }
        }
        if dry_run {
            tx.rollback()?;
        } else {
            tx.commit()?;
        }
        info!(
            scanned = report.scanned,
            changed = report.changed,
            dry_run,
            "location normalization pass finished"
        );
        Ok(report)
    }

    /// Rewrite `cmu_id` from the raw bag where they disagree, then fill blank
    /// company names from another component under the same CMU.
    pub fn repair_cmu_ids(&mut self, dry_run: bool) -> Result<RepairReport, StoreError> {
        let tx = self.connection_mut().transaction()?;
        let mut report = RepairReport {
            dry_run,
            ..RepairReport::default()
        };
        {
            let mut select = tx.prepare("SELECT component_id, cmu_id, raw_data FROM components")?;
            let rows = select
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let mut update = tx.prepare(
                "UPDATE components SET cmu_id = ?2,
                   updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                 WHERE component_id = ?1",
            )?;
            for (component_id, stored, raw_text) in rows {
                report.scanned += 1;
                let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw_text)?;
                let Some(from_raw) = raw.get(CMU_ID_FIELD).and_then(raw_cmu_text) else {
                    continue;
                };
                if from_raw == stored {
                    continue;
                }
                update.execute(params![component_id, from_raw])?;
                report.cmu_ids_fixed += 1;
                if report.samples.len() < SAMPLE_LIMIT {
                    report.samples.push((component_id, stored, from_raw));
                }
            }
        }
        let filled = tx.execute(
            "UPDATE components
             SET company_name = (
                   SELECT donor.company_name FROM components AS donor
                   WHERE donor.cmu_id = components.cmu_id AND donor.company_name != ''
                   ORDER BY donor.id LIMIT 1),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE company_name = '' AND cmu_id != '' AND EXISTS (
                   SELECT 1 FROM components AS donor
                   WHERE donor.cmu_id = components.cmu_id AND donor.company_name != '')",
            [],
        )?;
        report.companies_filled = filled as u64;
        if dry_run {
            tx.rollback()?;
        } else {
            tx.commit()?;
        }
        info!(
            scanned = report.scanned,
            cmu_ids_fixed = report.cmu_ids_fixed,
            companies_filled = report.companies_filled,
            dry_run,
            "cmu repair pass finished"
        );
        Ok(report)
    }
}

fn raw_cmu_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}
