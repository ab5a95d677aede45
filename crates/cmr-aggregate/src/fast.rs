// SPDX-License-Identifier: Apache-2.0

use cmr_model::{
    sql_trim, ActiveYearTokens, CapacityConfidence, FacetCounts, LocationGroup,
    CAPACITY_SOURCE_DERATED, MAX_AUCTION_YEARS, MAX_DESCRIPTIONS, UNKNOWN_FACET,
};
use cmr_store::StoreError;
use rusqlite::{params, Connection, OptionalExtension};

fn facet_subquery(column: &str) -> String {
    let trimmed = sql_trim(column);
    format!(
        "(SELECT json_group_array(json_array(label, n)) FROM (
            SELECT CASE WHEN {trimmed} = '' THEN '{UNKNOWN_FACET}' ELSE {trimmed} END AS label,
                   COUNT(*) AS n, MIN(id) AS first_id
            FROM components WHERE location = ?1
            GROUP BY label ORDER BY n DESC, first_id ASC))"
    )
}

fn aggregate_sql() -> String {
    let description = sql_trim("description");
    let auction = sql_trim("auction_name");
    let cmu = sql_trim("cmu_id");
    format!(
        "SELECT
           COUNT(*),
           COALESCE(SUM(derated_capacity_mw), 0.0),
           COUNT(derated_capacity_mw),
           (SELECT json_group_array(d) FROM (
              SELECT {description} AS d FROM components
              WHERE location = ?1 AND {description} != ''
              GROUP BY d ORDER BY MIN(id) LIMIT {MAX_DESCRIPTIONS})),
           {technologies},
           {companies},
           (SELECT json_group_array(a) FROM (
              SELECT DISTINCT {auction} AS a FROM components
              WHERE location = ?1 AND {auction} != ''
              ORDER BY a DESC LIMIT {MAX_AUCTION_YEARS})),
           (SELECT json_group_array(c) FROM (
              SELECT DISTINCT {cmu} AS c FROM components
              WHERE location = ?1 AND {cmu} != ''
              ORDER BY c ASC))
         FROM components WHERE location = ?1",
        technologies = facet_subquery("technology"),
        companies = facet_subquery("company_name"),
    )
}

fn json_text<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(text)?)
}

/// Same group as [`crate::build_location_group`], computed with one aggregate
/// query instead of hydrating every component.
pub fn aggregate_location_sql(
    conn: &Connection,
    location: &str,
    tokens: &ActiveYearTokens,
) -> Result<Option<LocationGroup>, StoreError> {
    let row = conn.query_row(&aggregate_sql(), params![location], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;
    let (count, capacity, with_capacity, descriptions, technologies, companies, auctions, cmus) = row;
    if count <= 0 {
        return Ok(None);
    }
    let representative = conn
        .query_row(
            "SELECT component_id, latitude, longitude, county, outward_code FROM components
             WHERE location = ?1
             ORDER BY (latitude IS NULL OR longitude IS NULL), id LIMIT 1",
            params![location],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;
    let (rep_id, latitude, longitude, county, outward_code) = match representative {
        Some((id, lat, lng, county, outward)) => (Some(id), lat, lng, county, outward),
        None => (None, None, None, None, None),
    };

    let auction_years: Vec<String> = json_text(&auctions)?;
    let capacity = capacity.max(0.0);
    Ok(Some(LocationGroup {
        location: location.to_string(),
        component_count: count as u64,
        descriptions: json_text(&descriptions)?,
        technologies: FacetCounts::from_pairs(json_text(&technologies)?),
        companies: FacetCounts::from_pairs(json_text(&companies)?),
        is_active: tokens.is_active(&auction_years),
        auction_years,
        cmu_ids: json_text(&cmus)?,
        displayed_capacity_mw: capacity,
        normalized_capacity_mw: capacity,
        capacity_confidence: CapacityConfidence::from_coverage(with_capacity.max(0) as u64, count as u64),
        capacity_source: CAPACITY_SOURCE_DERATED.to_string(),
        latitude,
        longitude,
        county,
        outward_code,
        representative_component_id: rep_id,
    }))
}
