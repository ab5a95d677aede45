// SPDX-License-Identifier: Apache-2.0

use cmr_model::{CapacityConfidence, FacetCounts, LocationGroup};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::StoreError;

/// Column order expected by [`decode_group_row`].
pub const GROUP_COLUMNS: &str = "id, location, component_count, descriptions, technologies, \
     companies, auction_years, cmu_ids, displayed_capacity_mw, normalized_capacity_mw, \
     capacity_confidence, capacity_source, is_active, latitude, longitude, county, \
     outward_code, representative_component_id";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredGroup {
    pub id: i64,
    pub group: LocationGroup,
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn decode_group_row(row: &Row<'_>) -> rusqlite::Result<StoredGroup> {
    let confidence: String = row.get(10)?;
    let technologies: FacetCounts = json_col(row, 4)?;
    let companies: FacetCounts = json_col(row, 5)?;
    Ok(StoredGroup {
        id: row.get(0)?,
        group: LocationGroup {
            location: row.get(1)?,
            component_count: row.get::<_, i64>(2)?.max(0) as u64,
            descriptions: json_col(row, 3)?,
            technologies,
            companies,
            auction_years: json_col(row, 6)?,
            cmu_ids: json_col(row, 7)?,
            displayed_capacity_mw: row.get(8)?,
            normalized_capacity_mw: row.get(9)?,
            capacity_confidence: CapacityConfidence::parse(&confidence)
                .unwrap_or(CapacityConfidence::None),
            capacity_source: row.get(11)?,
            is_active: row.get(12)?,
            latitude: row.get(13)?,
            longitude: row.get(14)?,
            county: row.get(15)?,
            outward_code: row.get(16)?,
            representative_component_id: row.get(17)?,
        },
    })
}

/// Upsert keyed by location; the row id is stable across refreshes.
pub fn upsert_location_group(
    conn: &Connection,
    group: &LocationGroup,
    primary_technology: Option<&str>,
    primary_company: Option<&str>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO location_groups (
           location, component_count, descriptions, technologies, companies, auction_years,
           cmu_ids, displayed_capacity_mw, normalized_capacity_mw, capacity_confidence,
           capacity_source, is_active, latitude, longitude, county, outward_code,
           representative_component_id, primary_technology, primary_company
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
         ON CONFLICT(location) DO UPDATE SET
           component_count = excluded.component_count,
           descriptions = excluded.descriptions,
           technologies = excluded.technologies,
           companies = excluded.companies,
           auction_years = excluded.auction_years,
           cmu_ids = excluded.cmu_ids,
           displayed_capacity_mw = excluded.displayed_capacity_mw,
           normalized_capacity_mw = excluded.normalized_capacity_mw,
           capacity_confidence = excluded.capacity_confidence,
           capacity_source = excluded.capacity_source,
           is_active = excluded.is_active,
           latitude = excluded.latitude,
           longitude = excluded.longitude,
           county = excluded.county,
           outward_code = excluded.outward_code,
           representative_component_id = excluded.representative_component_id,
           primary_technology = excluded.primary_technology,
           primary_company = excluded.primary_company,
           updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        params![
            group.location,
            group.component_count as i64,
            serde_json::to_string(&group.descriptions)?,
            serde_json::to_string(&group.technologies)?,
            serde_json::to_string(&group.companies)?,
            serde_json::to_string(&group.auction_years)?,
            serde_json::to_string(&group.cmu_ids)?,
            group.displayed_capacity_mw,
            group.normalized_capacity_mw,
            group.capacity_confidence.as_str(),
            group.capacity_source,
            group.is_active,
            group.latitude,
            group.longitude,
            group.county,
            group.outward_code,
            group.representative_component_id,
            primary_technology,
            primary_company
        ],
    )?;
    Ok(())
}

pub fn read_location_group(conn: &Connection, id: i64) -> Result<Option<StoredGroup>, StoreError> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM location_groups WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], decode_group_row).optional()?)
}

pub fn read_location_group_by_location(
    conn: &Connection,
    location: &str,
) -> Result<Option<StoredGroup>, StoreError> {
    let sql = format!("SELECT {GROUP_COLUMNS} FROM location_groups WHERE location = ?1");
    Ok(conn.query_row(&sql, params![location], decode_group_row).optional()?)
}

pub fn count_location_groups(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM location_groups", [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

/// Truncate step of a full rebuild.
pub fn delete_all_location_groups(conn: &Connection) -> Result<usize, StoreError> {
    Ok(conn.execute("DELETE FROM location_groups", [])?)
}
