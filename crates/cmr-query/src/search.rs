// SPDX-License-Identifier: Apache-2.0

use cmr_aggregate::{aggregate_location_sql, gate_report};
use cmr_model::ActiveYearTokens;
use cmr_postcode::parse_outward_prefix;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filter::{component_order, component_predicate, group_order, group_predicate};
use crate::outcodes::{outward_locations_from_db, OutcodeIndex};
use crate::projection::{compile_projection, decode_group_view_row, GroupRow, View};
use crate::request::SearchRequest;
use crate::QueryError;

/// Where a page of results was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Groups,
    Components,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostcodeFallback {
    pub outward_code: String,
    pub locations: usize,
    pub from_static_index: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub rows: Vec<GroupRow>,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub total_locations: u64,
    pub total_components: u64,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode_fallback: Option<PostcodeFallback>,
    /// Set when the page is the flagged empty envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchPage {
    /// Empty envelope returned instead of surfacing a failure to the client.
    #[must_use]
    pub fn empty(req: &SearchRequest, error: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            page: req.page,
            per_page: req.per_page,
            total_pages: 0,
            total_locations: 0,
            total_components: 0,
            source: ResultSource::Groups,
            postcode_fallback: None,
            error: Some(error.into()),
        }
    }
}

pub struct SearchContext<'a> {
    pub tokens: &'a ActiveYearTokens,
    pub activation_threshold: f64,
    pub outcodes: Option<&'a dyn OutcodeIndex>,
}

fn total_pages(total: u64, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    (total as usize).div_ceil(per_page)
}

/// Search location groups, falling back to raw components while the
/// aggregate is not authoritative, and to an outward-code expansion when the
/// token match is empty.
pub fn search(
    conn: &Connection,
    req: &SearchRequest,
    ctx: &SearchContext<'_>,
) -> Result<SearchPage, QueryError> {
    let gate = gate_report(conn, ctx.activation_threshold)?;
    let authoritative = gate.is_authoritative;
    if !authoritative {
        debug!(coverage = gate.coverage, "aggregate not authoritative; searching components");
    }
    let run = |restrict: Option<&[String]>| {
        if authoritative {
            search_groups(conn, req, restrict)
        } else {
            search_components(conn, req, restrict, ctx.tokens)
        }
    };

    let page = run(None)?;
    if page.total_locations > 0 || req.q.is_empty() {
        return Ok(page);
    }
    let Some(outward) = parse_outward_prefix(&req.q) else {
        return Ok(page);
    };
    let from_index = ctx
        .outcodes
        .map(|index| index.locations_for(&outward))
        .unwrap_or_default();
    let from_static_index = !from_index.is_empty();
    let locations = if from_static_index {
        from_index
    } else {
        outward_locations_from_db(conn, &outward)?
    };
    if locations.is_empty() {
        return Ok(page);
    }
    let mut expanded = run(Some(&locations))?;
    expanded.postcode_fallback = Some(PostcodeFallback {
        outward_code: outward,
        locations: locations.len(),
        from_static_index,
    });
    Ok(expanded)
}

fn totals(conn: &Connection, sql: &str, params: &[Value]) -> Result<(u64, u64), QueryError> {
    let (locations, components): (i64, i64) =
        conn.query_row(sql, params_from_iter(params.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    Ok((locations.max(0) as u64, components.max(0) as u64))
}

/// One page plus its totals over `location_groups`: two queries regardless of
/// page size.
pub fn search_groups(
    conn: &Connection,
    req: &SearchRequest,
    restrict: Option<&[String]>,
) -> Result<SearchPage, QueryError> {
    let predicate = group_predicate(req, restrict);
    let where_sql = predicate.where_sql();

    let (total_locations, total_components) = totals(
        conn,
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(g.component_count), 0) FROM location_groups g{where_sql}"
        ),
        &predicate.params,
    )?;

    let (order_sql, order_params) = group_order(req);
    let sql = format!(
        "SELECT {} FROM location_groups g{where_sql}{order_sql} LIMIT ? OFFSET ?",
        compile_projection(View::List).join(", ")
    );
    let mut params = predicate.params;
    params.extend(order_params);
    params.push(Value::Integer(req.per_page as i64));
    params.push(Value::Integer(req.offset() as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), decode_group_view_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SearchPage {
        rows,
        page: req.page,
        per_page: req.per_page,
        total_pages: total_pages(total_locations, req.per_page),
        total_locations,
        total_components,
        source: ResultSource::Groups,
        postcode_fallback: None,
        error: None,
    })
}

/// The same search evaluated over raw components grouped by location. Page
/// rows are aggregated on the fly.
pub fn search_components(
    conn: &Connection,
    req: &SearchRequest,
    restrict: Option<&[String]>,
    tokens: &ActiveYearTokens,
) -> Result<SearchPage, QueryError> {
    let predicate = component_predicate(req, restrict, tokens);
    let where_sql = predicate.where_sql();

    let (total_locations, total_components) = totals(
        conn,
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(n), 0) FROM (
               SELECT l.location, COUNT(*) AS n FROM components l{where_sql} GROUP BY l.location)"
        ),
        &predicate.params,
    )?;

    let (order_sql, order_params) = component_order(req);
    let sql = format!(
        "SELECT l.location FROM components l{where_sql} GROUP BY l.location{order_sql} LIMIT ? OFFSET ?"
    );
    let mut params = predicate.params;
    params.extend(order_params);
    params.push(Value::Integer(req.per_page as i64));
    params.push(Value::Integer(req.offset() as i64));

    let locations: Vec<String> = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    let mut rows = Vec::with_capacity(locations.len());
    for location in &locations {
        match aggregate_location_sql(conn, location, tokens)? {
            Some(group) => rows.push(GroupRow::from_group(None, &group, View::List)),
            None => warn!(location = %location, "location vanished during component search"),
        }
    }

    Ok(SearchPage {
        rows,
        page: req.page,
        per_page: req.per_page,
        total_pages: total_pages(total_locations, req.per_page),
        total_locations,
        total_components,
        source: ResultSource::Components,
        postcode_fallback: None,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(total_pages(0, 25), 0);
        assert_eq!(total_pages(25, 25), 1);
        assert_eq!(total_pages(26, 25), 2);
    }
}
