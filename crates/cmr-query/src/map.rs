// SPDX-License-Identifier: Apache-2.0

use cmr_aggregate::{aggregate_location_sql, gate_report};
use cmr_model::{primary_company, primary_technology, ActiveYearTokens};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filter::{component_order, component_predicate, group_order, group_predicate};
use crate::request::SearchRequest;
use crate::search::{ResultSource, SearchContext};
use crate::QueryError;

pub const MAX_MAP_FEATURES: usize = 2000;

/// Only what the map renderer draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapProperties {
    /// Group id; absent while features are read from raw components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub technology: Option<String>,
    pub company: Option<String>,
    pub component_count: u64,
    pub is_active: bool,
    pub capacity_mw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PointGeometry,
    pub properties: MapProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
    pub truncated: bool,
    pub source: ResultSource,
}

fn point(latitude: f64, longitude: f64, properties: MapProperties) -> Feature {
    Feature {
        kind: "Feature".to_string(),
        geometry: PointGeometry {
            kind: "Point".to_string(),
            coordinates: [longitude, latitude],
        },
        properties,
    }
}

fn collection(mut features: Vec<Feature>, limit: usize, source: ResultSource) -> FeatureCollection {
    let truncated = features.len() > limit;
    features.truncate(limit);
    FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features,
        truncated,
        source,
    }
}

/// Sited locations matching the request's filters as a GeoJSON collection.
/// Pagination is ignored; at most `limit` features are returned. Reads raw
/// components while the aggregate is below its activation threshold.
pub fn map_features(
    conn: &Connection,
    req: &SearchRequest,
    limit: usize,
    ctx: &SearchContext<'_>,
) -> Result<FeatureCollection, QueryError> {
    let limit = limit.clamp(1, MAX_MAP_FEATURES);
    let gate = gate_report(conn, ctx.activation_threshold)?;
    if gate.is_authoritative {
        map_groups(conn, req, limit)
    } else {
        debug!(coverage = gate.coverage, "aggregate not authoritative; mapping components");
        map_components(conn, req, limit, ctx.tokens)
    }
}

fn map_groups(
    conn: &Connection,
    req: &SearchRequest,
    limit: usize,
) -> Result<FeatureCollection, QueryError> {
    let mut predicate = group_predicate(req, None);
    predicate.clauses.push("g.latitude IS NOT NULL AND g.longitude IS NOT NULL".to_string());
    let (order_sql, order_params) = group_order(req);
    let sql = format!(
        "SELECT g.id, g.location, g.latitude, g.longitude, g.primary_technology,
                g.primary_company, g.component_count, g.is_active, g.normalized_capacity_mw
         FROM location_groups g{}{order_sql} LIMIT ?",
        predicate.where_sql()
    );
    let mut params = predicate.params;
    params.extend(order_params);
    params.push(Value::Integer(limit as i64 + 1));

    let mut stmt = conn.prepare(&sql)?;
    let features = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(point(
                row.get(2)?,
                row.get(3)?,
                MapProperties {
                    id: Some(row.get(0)?),
                    title: row.get(1)?,
                    technology: row.get(4)?,
                    company: row.get(5)?,
                    component_count: row.get::<_, i64>(6)?.max(0) as u64,
                    is_active: row.get(7)?,
                    capacity_mw: row.get(8)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collection(features, limit, ResultSource::Groups))
}

/// Locations with at least one sited component, aggregated on the fly.
fn map_components(
    conn: &Connection,
    req: &SearchRequest,
    limit: usize,
    tokens: &ActiveYearTokens,
) -> Result<FeatureCollection, QueryError> {
    let predicate = component_predicate(req, None, tokens);
    let (order_sql, order_params) = component_order(req);
    let sql = format!(
        "SELECT l.location FROM components l{} GROUP BY l.location
         HAVING SUM(l.latitude IS NOT NULL AND l.longitude IS NOT NULL) > 0{order_sql} LIMIT ?",
        predicate.where_sql()
    );
    let mut params = predicate.params;
    params.extend(order_params);
    params.push(Value::Integer(limit as i64 + 1));

    let locations: Vec<String> = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    let mut features = Vec::with_capacity(locations.len());
    for location in &locations {
        let Some(group) = aggregate_location_sql(conn, location, tokens)? else {
            warn!(location = %location, "location vanished during component map");
            continue;
        };
        let (Some(latitude), Some(longitude)) = (group.latitude, group.longitude) else {
            continue;
        };
        features.push(point(
            latitude,
            longitude,
            MapProperties {
                id: None,
                title: group.location.clone(),
                technology: primary_technology(&group.technologies).map(str::to_string),
                company: primary_company(&group.companies).map(str::to_string),
                component_count: group.component_count,
                is_active: group.is_active,
                capacity_mw: group.normalized_capacity_mw,
            },
        ));
    }
    Ok(collection(features, limit, ResultSource::Components))
}
