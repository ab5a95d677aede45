// SPDX-License-Identifier: Apache-2.0

use cmr_store::{StoreError, EXCLUDED_LOCATION_SQL};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateReport {
    pub groups: u64,
    pub covered_components: u64,
    pub total_components: u64,
    pub coverage: f64,
    pub threshold: f64,
    pub is_authoritative: bool,
}

/// Read-time activation check: components covered by location groups over
/// groupable components. Below `threshold` the request path must not trust
/// the aggregate table.
pub fn gate_report(conn: &Connection, threshold: f64) -> Result<GateReport, StoreError> {
    let sql = format!(
        "SELECT
           (SELECT COUNT(*) FROM location_groups),
           (SELECT COALESCE(SUM(component_count), 0) FROM location_groups),
           (SELECT COUNT(*) FROM components WHERE NOT {EXCLUDED_LOCATION_SQL})"
    );
    let (groups, covered, total): (i64, i64, i64) =
        conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    let (groups, covered, total) = (groups.max(0) as u64, covered.max(0) as u64, total.max(0) as u64);
    let coverage = if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    };
    Ok(GateReport {
        groups,
        covered_components: covered,
        total_components: total,
        coverage,
        threshold,
        is_authoritative: total > 0 && coverage >= threshold,
    })
}
