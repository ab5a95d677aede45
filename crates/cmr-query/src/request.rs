// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Page sizes a list endpoint serves; anything else snaps up to the next one.
pub const PAGE_SIZES: [usize; 3] = [10, 25, 50];
pub const DEFAULT_PER_PAGE: usize = 25;
pub const MAX_QUERY_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl StatusFilter {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Some(Self::All),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Location,
    Capacity,
    Components,
    Relevance,
}

impl SortBy {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "location" => Some(Self::Location),
            "capacity" => Some(Self::Capacity),
            "components" => Some(Self::Components),
            "relevance" => Some(Self::Relevance),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Capacity => "capacity",
            Self::Components => "components",
            Self::Relevance => "relevance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query-string shape of the list and map endpoints. Every field is optional
/// text; [`SearchRequest::from_params`] decides what it means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "auction_year")]
    pub auction: Option<String>,
    pub technology: Option<String>,
    pub company: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    pub status: StatusFilter,
    pub auction: Option<String>,
    pub technology: Option<String>,
    pub company: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub page: usize,
    pub per_page: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            q: String::new(),
            status: StatusFilter::All,
            auction: None,
            technology: None,
            company: None,
            sort_by: SortBy::Location,
            sort_order: SortOrder::Asc,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// NFKC, collapse whitespace, clip to [`MAX_QUERY_LEN`] characters.
#[must_use]
pub fn normalize_query(raw: &str) -> String {
    let composed: String = raw.nfkc().collect();
    let collapsed = composed.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_QUERY_LEN).collect()
}

/// Snap a requested page size up to the nearest served size, then clamp to
/// `cap`. Unparseable or zero sizes use the default.
#[must_use]
pub fn snap_per_page(requested: Option<usize>, cap: usize) -> usize {
    let cap = PAGE_SIZES
        .iter()
        .copied()
        .filter(|s| *s <= cap)
        .max()
        .unwrap_or(PAGE_SIZES[0]);
    let wanted = match requested {
        Some(n) if n > 0 => n,
        _ => DEFAULT_PER_PAGE,
    };
    PAGE_SIZES
        .iter()
        .copied()
        .find(|s| *s >= wanted)
        .unwrap_or(cap)
        .min(cap)
}

fn non_blank(raw: Option<&String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl SearchRequest {
    /// Lenient parse: unknown values fall back to defaults so the request
    /// path never fails on a malformed query string.
    #[must_use]
    pub fn from_params(params: &SearchParams, per_page_cap: usize) -> Self {
        let page = params
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let per_page = snap_per_page(
            params
                .per_page
                .as_deref()
                .and_then(|p| p.trim().parse::<usize>().ok()),
            per_page_cap,
        );
        Self {
            q: normalize_query(params.q.as_deref().unwrap_or_default()),
            status: params
                .status
                .as_deref()
                .and_then(StatusFilter::parse)
                .unwrap_or_default(),
            auction: non_blank(params.auction.as_ref()),
            technology: non_blank(params.technology.as_ref()),
            company: non_blank(params.company.as_ref()),
            sort_by: params
                .sort_by
                .as_deref()
                .and_then(SortBy::parse)
                .unwrap_or_default(),
            sort_order: params
                .sort_order
                .as_deref()
                .and_then(SortOrder::parse)
                .unwrap_or_default(),
            page,
            per_page,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> Vec<&str> {
        self.q.split_whitespace().collect()
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    /// Stable text for the normalized filter tuple; two requests that select
    /// the same page share it.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!(
            "q={}|status={}|auction={}|technology={}|company={}|sort={}:{}|page={}|per_page={}",
            self.q.to_ascii_lowercase(),
            self.status.as_str(),
            self.auction.as_deref().unwrap_or_default(),
            self.technology.as_deref().unwrap_or_default(),
            self.company.as_deref().unwrap_or_default(),
            self.sort_by.as_str(),
            self.sort_order.as_sql(),
            self.page,
            self.per_page
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_sizes_snap_and_clamp() {
        assert_eq!(snap_per_page(Some(10), 50), 10);
        assert_eq!(snap_per_page(Some(11), 50), 25);
        assert_eq!(snap_per_page(Some(26), 50), 50);
        assert_eq!(snap_per_page(Some(500), 50), 50);
        assert_eq!(snap_per_page(Some(0), 50), 25);
        assert_eq!(snap_per_page(None, 50), 25);
        assert_eq!(snap_per_page(Some(50), 25), 25);
        assert_eq!(snap_per_page(Some(40), 10), 10);
    }

    #[test]
    fn lenient_parse_defaults_unknown_values() {
        let req = SearchRequest::from_params(
            &SearchParams {
                q: Some("  Tesco \t Extra  ".to_string()),
                status: Some("ACTIVE".to_string()),
                sort_by: Some("bogus".to_string()),
                sort_order: Some("desc".to_string()),
                page: Some("-3".to_string()),
                per_page: Some("1000".to_string()),
                auction: Some("  ".to_string()),
                ..SearchParams::default()
            },
            50,
        );
        assert_eq!(req.q, "Tesco Extra");
        assert_eq!(req.tokens(), vec!["Tesco", "Extra"]);
        assert_eq!(req.status, StatusFilter::Active);
        assert_eq!(req.sort_by, SortBy::Location);
        assert_eq!(req.sort_order, SortOrder::Desc);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, 50);
        assert_eq!(req.auction, None);
    }

    #[test]
    fn query_is_nfkc_normalized() {
        assert_eq!(normalize_query("ＳＷ１１"), "SW11");
        assert_eq!(normalize_query(&"x".repeat(500)).len(), MAX_QUERY_LEN);
    }

    #[test]
    fn fingerprint_ignores_ascii_case_of_query() {
        let a = SearchRequest {
            q: "Boots".to_string(),
            ..SearchRequest::default()
        };
        let b = SearchRequest {
            q: "BOOTS".to_string(),
            ..SearchRequest::default()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = SearchRequest {
            page: 2,
            ..a.clone()
        };
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
