// SPDX-License-Identifier: Apache-2.0

use cmr_aggregate::gate_report;
use cmr_model::{sql_trim, UNKNOWN_FACET};
use cmr_store::EXCLUDED_LOCATION_SQL;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::filter::escape_like;
use crate::request::normalize_query;
use crate::QueryError;

pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySuggestion {
    pub company_name: String,
    pub component_count: u64,
    pub locations: u64,
}

/// Companies whose name contains any query token, ranked by component count
/// summed across the groups that list them. While the aggregate is below
/// `activation_threshold` the ranking is computed from raw components.
pub fn company_suggestions(
    conn: &Connection,
    q: &str,
    limit: usize,
    activation_threshold: f64,
) -> Result<Vec<CompanySuggestion>, QueryError> {
    let q = normalize_query(q);
    let tokens: Vec<&str> = q.split_whitespace().collect();
    if tokens.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let sql = if gate_report(conn, activation_threshold)?.is_authoritative {
        let matches = vec!["j.key LIKE ? ESCAPE '!'"; tokens.len()].join(" OR ");
        format!(
            "SELECT j.key, SUM(j.value) AS total, COUNT(*) AS locations
             FROM location_groups g, json_each(g.companies) j
             WHERE j.key != '{UNKNOWN_FACET}' AND ({matches})
             GROUP BY j.key
             ORDER BY total DESC, j.key ASC
             LIMIT ?"
        )
    } else {
        let company = sql_trim("company_name");
        let matches = vec![format!("{company} LIKE ? ESCAPE '!'"); tokens.len()].join(" OR ");
        format!(
            "SELECT {company} AS name, COUNT(*) AS total, COUNT(DISTINCT location) AS locations
             FROM components
             WHERE NOT {EXCLUDED_LOCATION_SQL} AND {company} != '' AND ({matches})
             GROUP BY name
             ORDER BY total DESC, name ASC
             LIMIT ?"
        )
    };
    let mut params: Vec<Value> = tokens
        .iter()
        .map(|t| Value::Text(format!("%{}%", escape_like(t))))
        .collect();
    params.push(Value::Integer(limit as i64));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        Ok(CompanySuggestion {
            company_name: row.get(0)?,
            component_count: row.get::<_, i64>(1)?.max(0) as u64,
            locations: row.get::<_, i64>(2)?.max(0) as u64,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
