// SPDX-License-Identifier: Apache-2.0

use cmr_model::{ComponentSummary, MAX_COMPONENTS_PER_LOCATION};
use cmr_store::ComponentStore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::projection::{compile_projection, decode_group_view_row, GroupRow, View};
use crate::QueryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDetail {
    pub group: GroupRow,
    pub representative_component_id: Option<String>,
    /// First components at the location in insertion order.
    pub components: Vec<ComponentSummary>,
}

/// Detail view of one location group by id.
pub fn location_detail(conn: &Connection, id: i64) -> Result<Option<LocationDetail>, QueryError> {
    let sql = format!(
        "SELECT {}, g.representative_component_id FROM location_groups g WHERE g.id = ?1",
        compile_projection(View::Detail).join(", ")
    );
    let found = conn
        .query_row(&sql, params![id], |row| {
            Ok((decode_group_view_row(row)?, row.get::<_, Option<String>>(16)?))
        })
        .optional()?;
    let Some((group, representative_component_id)) = found else {
        return Ok(None);
    };
    let mut stmt = conn.prepare_cached(
        "SELECT component_id, cmu_id, company_name, technology, auction_name, derated_capacity_mw
         FROM components WHERE location = ?1 ORDER BY id LIMIT ?2",
    )?;
    let components = stmt
        .query_map(params![group.location, MAX_COMPONENTS_PER_LOCATION as i64], |row| {
            Ok(ComponentSummary {
                component_id: row.get(0)?,
                cmu_id: row.get(1)?,
                company_name: row.get(2)?,
                technology: row.get(3)?,
                auction_name: row.get(4)?,
                derated_capacity_mw: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(LocationDetail {
        group,
        representative_component_id,
        components,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComponent {
    pub component_id: String,
    pub raw: BTreeMap<String, Value>,
}

/// Verbatim upstream fields of one component, served on demand only.
pub fn component_raw(
    store: &ComponentStore,
    component_id: &str,
) -> Result<Option<RawComponent>, QueryError> {
    Ok(store.raw_data(component_id)?.map(|raw| RawComponent {
        component_id: component_id.to_string(),
        raw,
    }))
}
