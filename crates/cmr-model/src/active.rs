// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Substrings that mark an auction label as belonging to a live delivery year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveYearTokens(Vec<String>);

impl ActiveYearTokens {
    #[must_use]
    pub fn new(tokens: Vec<String>) -> Self {
        Self(
            tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        self.0.iter().any(|t| label.contains(t.as_str()))
    }

    /// The `is_active` predicate persisted on every location group.
    #[must_use]
    pub fn is_active<S: AsRef<str>>(&self, auction_years: &[S]) -> bool {
        auction_years.iter().any(|y| self.matches(y.as_ref()))
    }
}

/// True when `label` carries a `YYYY-YY` delivery-year token.
#[must_use]
pub fn has_year_token(label: &str) -> bool {
    label
        .as_bytes()
        .windows(7)
        .any(|w| {
            w[..4].iter().all(u8::is_ascii_digit)
                && w[4] == b'-'
                && w[5..].iter().all(u8::is_ascii_digit)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> ActiveYearTokens {
        ActiveYearTokens::new(vec!["2024-25".to_string(), "2025-26".to_string()])
    }

    #[test]
    fn any_label_containing_a_token_is_active() {
        let t = tokens();
        assert!(t.is_active(&["T-1 2022-23", "T-4 2024-25"]));
        assert!(!t.is_active(&["T-1 2022-23", "T-4 2023-24"]));
        assert!(!t.is_active::<&str>(&[]));
    }

    #[test]
    fn blank_tokens_are_dropped() {
        let t = ActiveYearTokens::new(vec![" ".to_string(), "2024-25".to_string()]);
        assert_eq!(t.tokens(), ["2024-25".to_string()]);
        assert!(!t.matches("anything"));
    }

    #[test]
    fn year_token_detection() {
        assert!(has_year_token("T-4 2024-25"));
        assert!(has_year_token("2019-20 T-1"));
        assert!(!has_year_token("Transitional Auction"));
        assert!(!has_year_token("T-4 2024"));
    }
}
