// SPDX-License-Identifier: Apache-2.0

use cmr_model::{CapacityConfidence, FacetCounts};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Which endpoint a row is read for. Each view declares the columns it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    List,
    Detail,
}

/// Per-view column switches for the deferrable aggregate columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub descriptions: bool,
    pub auction_years: bool,
    pub cmu_ids: bool,
}

impl View {
    #[must_use]
    pub const fn projection(self) -> Projection {
        match self {
            Self::List => Projection {
                descriptions: false,
                auction_years: false,
                cmu_ids: false,
            },
            Self::Detail => Projection {
                descriptions: true,
                auction_years: true,
                cmu_ids: true,
            },
        }
    }
}

/// Select list for `location_groups g`; deferred columns are `NULL AS col`
/// so [`decode_group_view_row`] reads by fixed position.
#[must_use]
pub fn compile_projection(view: View) -> Vec<String> {
    let p = view.projection();
    let deferred = |on: bool, col: &str| {
        if on {
            format!("g.{col}")
        } else {
            format!("NULL AS {col}")
        }
    };
    vec![
        "g.id".to_string(),
        "g.location".to_string(),
        "g.component_count".to_string(),
        "g.technologies".to_string(),
        "g.companies".to_string(),
        "g.normalized_capacity_mw".to_string(),
        "g.displayed_capacity_mw".to_string(),
        "g.capacity_confidence".to_string(),
        "g.is_active".to_string(),
        "g.county".to_string(),
        "g.outward_code".to_string(),
        "g.latitude".to_string(),
        "g.longitude".to_string(),
        deferred(p.descriptions, "descriptions"),
        deferred(p.auction_years, "auction_years"),
        deferred(p.cmu_ids, "cmu_ids"),
    ]
}

/// One location group as an endpoint renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    /// `None` for rows synthesized from components while the aggregate is
    /// not authoritative.
    pub id: Option<i64>,
    pub location: String,
    pub component_count: u64,
    pub technologies: FacetCounts,
    pub companies: FacetCounts,
    pub normalized_capacity_mw: f64,
    pub displayed_capacity_mw: f64,
    pub capacity_confidence: CapacityConfidence,
    pub is_active: bool,
    pub county: Option<String>,
    pub outward_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auction_years: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmu_ids: Option<Vec<String>>,
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_json_col<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
    }
}

pub fn decode_group_view_row(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    let confidence: String = row.get(7)?;
    Ok(GroupRow {
        id: Some(row.get(0)?),
        location: row.get(1)?,
        component_count: row.get::<_, i64>(2)?.max(0) as u64,
        technologies: json_col(row, 3)?,
        companies: json_col(row, 4)?,
        normalized_capacity_mw: row.get(5)?,
        displayed_capacity_mw: row.get(6)?,
        capacity_confidence: CapacityConfidence::parse(&confidence)
            .unwrap_or(CapacityConfidence::None),
        is_active: row.get(8)?,
        county: row.get(9)?,
        outward_code: row.get(10)?,
        latitude: row.get(11)?,
        longitude: row.get(12)?,
        descriptions: optional_json_col(row, 13)?,
        auction_years: optional_json_col(row, 14)?,
        cmu_ids: optional_json_col(row, 15)?,
    })
}

impl GroupRow {
    #[must_use]
    pub fn from_group(id: Option<i64>, group: &cmr_model::LocationGroup, view: View) -> Self {
        let p = view.projection();
        Self {
            id,
            location: group.location.clone(),
            component_count: group.component_count,
            technologies: group.technologies.clone(),
            companies: group.companies.clone(),
            normalized_capacity_mw: group.normalized_capacity_mw,
            displayed_capacity_mw: group.displayed_capacity_mw,
            capacity_confidence: group.capacity_confidence,
            is_active: group.is_active,
            county: group.county.clone(),
            outward_code: group.outward_code.clone(),
            latitude: group.latitude,
            longitude: group.longitude,
            descriptions: p.descriptions.then(|| group.descriptions.clone()),
            auction_years: p.auction_years.then(|| group.auction_years.clone()),
            cmu_ids: p.cmu_ids.then(|| group.cmu_ids.clone()),
        }
    }
}
