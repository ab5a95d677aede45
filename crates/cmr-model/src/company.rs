// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionLink {
    pub auction: String,
    pub count: u64,
    pub url: String,
}

/// Per-company index so company pages never group the component table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyLinks {
    pub company_name: String,
    pub auction_links: Vec<AuctionLink>,
    pub component_count: u64,
    pub auction_count: u64,
}

impl CompanyLinks {
    /// `per_auction` pairs in any order; links come out newest auction first.
    #[must_use]
    pub fn from_counts(company_name: &str, mut per_auction: Vec<(String, u64)>) -> Self {
        per_auction.sort_by(|a, b| b.0.cmp(&a.0));
        let auction_links: Vec<AuctionLink> = per_auction
            .into_iter()
            .map(|(auction, count)| AuctionLink {
                url: company_search_link(company_name, &auction),
                auction,
                count,
            })
            .collect();
        Self {
            company_name: company_name.to_string(),
            component_count: auction_links.iter().map(|l| l.count).sum(),
            auction_count: auction_links.len() as u64,
            auction_links,
        }
    }
}

#[must_use]
pub fn company_search_link(company: &str, auction: &str) -> String {
    format!(
        "/search/?company={}&auction={}",
        encode_query_component(company),
        encode_query_component(auction)
    )
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
#[must_use]
pub fn encode_query_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_sorted_and_summed() {
        let links = CompanyLinks::from_counts(
            "Acme & Sons Ltd",
            vec![("T-1 2022-23".to_string(), 2), ("T-4 2024-25".to_string(), 5)],
        );
        assert_eq!(links.component_count, 7);
        assert_eq!(links.auction_count, 2);
        assert_eq!(links.auction_links[0].auction, "T-4 2024-25");
        assert_eq!(
            links.auction_links[0].url,
            "/search/?company=Acme%20%26%20Sons%20Ltd&auction=T-4%202024-25"
        );
    }
}
