// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};

use crate::active::ActiveYearTokens;
use crate::serde_helpers::{deserialize_ordered_counts, serialize_ordered_counts};

pub const MAX_DESCRIPTIONS: usize = 3;
pub const MAX_AUCTION_YEARS: usize = 5;
pub const UNKNOWN_FACET: &str = "Unknown";
pub const CAPACITY_SOURCE_DERATED: &str = "derated_capacity_mw";

/// Characters stripped from both ends of text fields before they are grouped.
/// SQLite's one-argument `trim` strips spaces only, so SQL aggregates use
/// [`sql_trim`] to strip the same set.
pub const FIELD_WHITESPACE: [char; 6] = [' ', '\t', '\n', '\u{b}', '\u{c}', '\r'];

#[must_use]
pub fn trim_field(raw: &str) -> &str {
    raw.trim_matches(|c: char| FIELD_WHITESPACE.contains(&c))
}

/// SQL expression trimming `expr` by [`FIELD_WHITESPACE`].
#[must_use]
pub fn sql_trim(expr: &str) -> String {
    format!("trim({expr}, char(32, 9, 10, 11, 12, 13))")
}

/// Label → component count, ordered by descending count then first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FacetCounts(Vec<(String, u64)>);

impl FacetCounts {
    /// Tally labels in input order. Blank labels count under [`UNKNOWN_FACET`].
    #[must_use]
    pub fn tally<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out: Vec<(String, u64)> = Vec::new();
        for raw in labels {
            let label = trim_field(raw);
            let key = if label.is_empty() { UNKNOWN_FACET } else { label };
            if let Some(entry) = out.iter_mut().find(|(k, _)| k == key) {
                entry.1 += 1;
            } else {
                out.push((key.to_string(), 1));
            }
        }
        // stable: ties keep first-seen order
        out.sort_by(|a, b| b.1.cmp(&a.1));
        Self(out)
    }

    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, u64)>) -> Self {
        Self(pairs)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().map(|(_, v)| *v).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest-count label; first seen wins ties.
    #[must_use]
    pub fn top(&self) -> Option<&str> {
        self.0.first().map(|(k, _)| k.as_str())
    }
}

impl Serialize for FacetCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_ordered_counts(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for FacetCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_ordered_counts(deserializer).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityConfidence {
    None,
    Low,
    Medium,
    High,
}

impl CapacityConfidence {
    /// `with_capacity` of `total` components carried a capacity figure.
    #[must_use]
    pub fn from_coverage(with_capacity: u64, total: u64) -> Self {
        if with_capacity == 0 || total == 0 {
            Self::None
        } else if with_capacity == total {
            Self::High
        } else if with_capacity * 2 >= total {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl Display for CapacityConfidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialized aggregate over every component sharing a normalized location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationGroup {
    pub location: String,
    pub component_count: u64,
    pub descriptions: Vec<String>,
    pub technologies: FacetCounts,
    pub companies: FacetCounts,
    pub auction_years: Vec<String>,
    pub cmu_ids: Vec<String>,
    pub displayed_capacity_mw: f64,
    pub normalized_capacity_mw: f64,
    pub capacity_confidence: CapacityConfidence,
    pub capacity_source: String,
    pub is_active: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub county: Option<String>,
    pub outward_code: Option<String>,
    /// Lookup key only; the group never owns the component.
    pub representative_component_id: Option<String>,
}

impl LocationGroup {
    /// Every persisted group must pass this check.
    pub fn check_invariants(&self, tokens: &ActiveYearTokens) -> Result<(), String> {
        if self.component_count == 0 {
            return Err(format!("{}: component_count must be >= 1", self.location));
        }
        if self.technologies.total() != self.component_count {
            return Err(format!(
                "{}: technologies sum {} != component_count {}",
                self.location,
                self.technologies.total(),
                self.component_count
            ));
        }
        if self.companies.total() != self.component_count {
            return Err(format!(
                "{}: companies sum {} != component_count {}",
                self.location,
                self.companies.total(),
                self.component_count
            ));
        }
        if self.technologies.keys().chain(self.companies.keys()).any(str::is_empty) {
            return Err(format!("{}: facet maps must not contain empty keys", self.location));
        }
        if self.is_active != tokens.is_active(&self.auction_years) {
            return Err(format!(
                "{}: is_active disagrees with auction_years",
                self.location
            ));
        }
        if self.descriptions.len() > MAX_DESCRIPTIONS || self.auction_years.len() > MAX_AUCTION_YEARS
        {
            return Err(format!("{}: truncated lists exceed their caps", self.location));
        }
        if self.displayed_capacity_mw < 0.0 || self.normalized_capacity_mw < 0.0 {
            return Err(format!("{}: capacity must be >= 0", self.location));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_orders_by_count_then_first_seen() {
        let counts = FacetCounts::tally(["Gas", "Battery", "Gas", "Solar", ""]);
        let pairs: Vec<_> = counts.iter().collect();
        assert_eq!(
            pairs,
            vec![("Gas", 2), ("Battery", 1), ("Solar", 1), (UNKNOWN_FACET, 1)]
        );
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.top(), Some("Gas"));
    }

    #[test]
    fn facet_json_preserves_order() {
        let counts = FacetCounts::tally(["B", "A", "A"]);
        let text = serde_json::to_string(&counts).expect("serialize");
        assert_eq!(text, r#"{"A":2,"B":1}"#);
        let counts = FacetCounts::from_pairs(vec![("Z".to_string(), 3), ("A".to_string(), 1)]);
        let text = serde_json::to_string(&counts).expect("serialize");
        assert_eq!(text, r#"{"Z":3,"A":1}"#);
        let back: FacetCounts = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, counts);
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(CapacityConfidence::from_coverage(0, 4), CapacityConfidence::None);
        assert_eq!(CapacityConfidence::from_coverage(1, 4), CapacityConfidence::Low);
        assert_eq!(CapacityConfidence::from_coverage(2, 4), CapacityConfidence::Medium);
        assert_eq!(CapacityConfidence::from_coverage(4, 4), CapacityConfidence::High);
        assert_eq!(CapacityConfidence::parse("medium"), Some(CapacityConfidence::Medium));
    }
}
