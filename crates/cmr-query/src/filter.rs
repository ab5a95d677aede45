// SPDX-License-Identifier: Apache-2.0

use cmr_model::{sql_trim, ActiveYearTokens, UNKNOWN_FACET};
use cmr_store::EXCLUDED_LOCATION_SQL;
use rusqlite::types::Value;

use crate::request::{SearchRequest, SortBy, StatusFilter};

/// A conjunction of SQL conditions with their positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clauses: Vec<String>,
    pub params: Vec<Value>,
}

impl Predicate {
    fn push(&mut self, clause: String, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause);
        self.params.extend(params);
    }

    #[must_use]
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

#[must_use]
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '!' | '%' | '_') {
            out.push('!');
        }
        out.push(c);
    }
    out
}

fn contains(raw: &str) -> Value {
    Value::Text(format!("%{}%", escape_like(raw)))
}

fn text(raw: &str) -> Value {
    Value::Text(raw.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Token matching plus facet filters over `location_groups g`. `restrict`
/// replaces token matching with a fixed location set.
#[must_use]
pub fn group_predicate(req: &SearchRequest, restrict: Option<&[String]>) -> Predicate {
    let mut p = Predicate::default();
    match restrict {
        Some(locations) => p.push(
            format!("g.location IN ({})", placeholders(locations.len().max(1))),
            if locations.is_empty() {
                vec![Value::Null]
            } else {
                locations.iter().map(|l| text(l)).collect()
            },
        ),
        None => {
            for token in req.tokens() {
                let like = contains(token);
                p.push(
                    "(g.location LIKE ? ESCAPE '!' \
                     OR EXISTS (SELECT 1 FROM json_each(g.companies) WHERE key LIKE ? ESCAPE '!') \
                     OR EXISTS (SELECT 1 FROM json_each(g.descriptions) WHERE value LIKE ? ESCAPE '!') \
                     OR EXISTS (SELECT 1 FROM json_each(g.cmu_ids) WHERE value LIKE ? ESCAPE '!') \
                     OR EXISTS (SELECT 1 FROM json_each(g.technologies) WHERE key LIKE ? ESCAPE '!'))"
                        .to_string(),
                    std::iter::repeat(like).take(5),
                );
            }
        }
    }
    match req.status {
        StatusFilter::All => {}
        StatusFilter::Active => p.push("g.is_active = 1".to_string(), []),
        StatusFilter::Inactive => p.push("g.is_active = 0".to_string(), []),
    }
    if let Some(auction) = &req.auction {
        p.push(
            "EXISTS (SELECT 1 FROM json_each(g.auction_years) WHERE value LIKE ? ESCAPE '!')"
                .to_string(),
            [contains(auction)],
        );
    }
    if let Some(technology) = &req.technology {
        p.push(
            "EXISTS (SELECT 1 FROM json_each(g.technologies) WHERE key = ?)".to_string(),
            [text(technology)],
        );
    }
    if let Some(company) = &req.company {
        p.push(
            "EXISTS (SELECT 1 FROM json_each(g.companies) WHERE key = ?)".to_string(),
            [text(company)],
        );
    }
    p
}

fn facet_label(column: &str) -> String {
    let trimmed = sql_trim(&format!("x.{column}"));
    format!("(CASE WHEN {trimmed} = '' THEN '{UNKNOWN_FACET}' ELSE {trimmed} END)")
}

/// The same filter semantics evaluated over raw components `l`, one result
/// row per location after `GROUP BY l.location`.
#[must_use]
pub fn component_predicate(
    req: &SearchRequest,
    restrict: Option<&[String]>,
    tokens: &ActiveYearTokens,
) -> Predicate {
    let mut p = Predicate::default();
    p.push(format!("NOT {}", EXCLUDED_LOCATION_SQL.replace("location", "l.location")), []);
    let at_location = "EXISTS (SELECT 1 FROM components x WHERE x.location = l.location AND";
    match restrict {
        Some(locations) => p.push(
            format!("l.location IN ({})", placeholders(locations.len().max(1))),
            if locations.is_empty() {
                vec![Value::Null]
            } else {
                locations.iter().map(|l| text(l)).collect()
            },
        ),
        None => {
            for token in req.tokens() {
                let like = contains(token);
                p.push(
                    format!(
                        "{at_location} (x.location LIKE ? ESCAPE '!' OR x.company_name LIKE ? ESCAPE '!' \
                         OR x.description LIKE ? ESCAPE '!' OR x.cmu_id LIKE ? ESCAPE '!' \
                         OR x.technology LIKE ? ESCAPE '!'))"
                    ),
                    std::iter::repeat(like).take(5),
                );
            }
        }
    }
    let active_tokens = tokens.tokens();
    let any_active = if active_tokens.is_empty() {
        "0".to_string()
    } else {
        format!(
            "{at_location} ({}))",
            vec!["x.auction_name LIKE ? ESCAPE '!'"; active_tokens.len()].join(" OR ")
        )
    };
    let active_params = || active_tokens.iter().map(|t| contains(t)).collect::<Vec<_>>();
    match req.status {
        StatusFilter::All => {}
        StatusFilter::Active => p.push(any_active, active_params()),
        StatusFilter::Inactive => p.push(format!("NOT {any_active}"), active_params()),
    }
    if let Some(auction) = &req.auction {
        p.push(
            format!("{at_location} x.auction_name LIKE ? ESCAPE '!')"),
            [contains(auction)],
        );
    }
    if let Some(technology) = &req.technology {
        p.push(
            format!("{at_location} {} = ?)", facet_label("technology")),
            [text(technology)],
        );
    }
    if let Some(company) = &req.company {
        p.push(
            format!("{at_location} {} = ?)", facet_label("company_name")),
            [text(company)],
        );
    }
    p
}

fn relevance_rank(column: &str, q: &str) -> (String, Vec<Value>) {
    let lowered = q.to_ascii_lowercase();
    (
        format!(
            "CASE WHEN lower({column}) = ? THEN 0 \
             WHEN lower({column}) LIKE ? ESCAPE '!' THEN 1 ELSE 2 END ASC"
        ),
        vec![
            Value::Text(lowered.clone()),
            Value::Text(format!("{}%", escape_like(&lowered))),
        ],
    )
}

/// ORDER BY for the group query; the row id breaks ties.
#[must_use]
pub fn group_order(req: &SearchRequest) -> (String, Vec<Value>) {
    let dir = req.sort_order.as_sql();
    match req.sort_by {
        SortBy::Location => (format!(" ORDER BY g.location {dir}, g.id ASC"), Vec::new()),
        SortBy::Capacity => (
            format!(" ORDER BY g.normalized_capacity_mw {dir}, g.id ASC"),
            Vec::new(),
        ),
        SortBy::Components => (
            format!(" ORDER BY g.component_count {dir}, g.id ASC"),
            Vec::new(),
        ),
        SortBy::Relevance if req.q.is_empty() => {
            (format!(" ORDER BY g.location {dir}, g.id ASC"), Vec::new())
        }
        SortBy::Relevance => {
            let (rank, params) = relevance_rank("g.location", &req.q);
            (format!(" ORDER BY {rank}, g.location {dir}, g.id ASC"), params)
        }
    }
}

/// ORDER BY for the per-location component aggregate.
#[must_use]
pub fn component_order(req: &SearchRequest) -> (String, Vec<Value>) {
    let dir = req.sort_order.as_sql();
    match req.sort_by {
        SortBy::Location => (format!(" ORDER BY l.location {dir}"), Vec::new()),
        SortBy::Capacity => (
            format!(" ORDER BY COALESCE(SUM(l.derated_capacity_mw), 0) {dir}, l.location ASC"),
            Vec::new(),
        ),
        SortBy::Components => (
            format!(" ORDER BY COUNT(*) {dir}, l.location ASC"),
            Vec::new(),
        ),
        SortBy::Relevance if req.q.is_empty() => {
            (format!(" ORDER BY l.location {dir}"), Vec::new())
        }
        SortBy::Relevance => {
            let (rank, params) = relevance_rank("l.location", &req.q);
            (format!(" ORDER BY {rank}, l.location {dir}"), params)
        }
    }
}
