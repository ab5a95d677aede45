// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const FULL_POSTCODE_PATTERN: &str = r"\b([A-Z]{1,2}[0-9][A-Z0-9]?)\s+([0-9][A-Z]{2})\b";
pub const OUTWARD_CODE_PATTERN: &str = r"\b[A-Z]{1,2}[0-9][A-Z0-9]?\b";

fn full_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FULL_POSTCODE_PATTERN).ok()).as_ref()
}

fn outward_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(OUTWARD_CODE_PATTERN).ok()).as_ref()
}

fn bare_outward_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]?$").ok())
        .as_ref()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostcodeMatches {
    /// Single-spaced, first appearance order.
    pub full_postcodes: Vec<String>,
    /// Outward codes not already covered by a full postcode.
    pub outward_codes: Vec<String>,
}

impl PostcodeMatches {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.full_postcodes.is_empty() && self.outward_codes.is_empty()
    }
}

/// Pull UK postcodes and bare outward codes out of free text.
#[must_use]
pub fn extract(text: &str) -> PostcodeMatches {
    let upper = text.to_uppercase();
    let mut out = PostcodeMatches::default();
    if let Some(re) = full_re() {
        for caps in re.captures_iter(&upper) {
            let postcode = format!("{} {}", &caps[1], &caps[2]);
            if !out.full_postcodes.contains(&postcode) {
                out.full_postcodes.push(postcode);
            }
        }
    }
    if let Some(re) = outward_re() {
        for m in re.find_iter(&upper) {
            let code = m.as_str();
            if out.full_postcodes.iter().any(|full| full.starts_with(code)) {
                continue;
            }
            if !out.outward_codes.iter().any(|c| c == code) {
                out.outward_codes.push(code.to_string());
            }
        }
    }
    out
}

#[must_use]
pub fn outward_of(postcode: &str) -> Option<&str> {
    postcode.split_whitespace().next()
}

/// Outward code a search query points at: the outward part of the first full
/// postcode, else the first token when it is itself an outward code.
#[must_use]
pub fn parse_outward_prefix(query: &str) -> Option<String> {
    let matches = extract(query);
    if let Some(full) = matches.full_postcodes.first() {
        return outward_of(full).map(str::to_string);
    }
    let first = query.split_whitespace().next()?.to_uppercase();
    let re = bare_outward_re()?;
    re.is_match(&first).then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_compile() {
        assert!(full_re().is_some());
        assert!(outward_re().is_some());
        assert!(bare_outward_re().is_some());
    }

    #[test]
    fn bare_outward_prefix_of_full_postcode_is_dropped() {
        let found = extract("Asda Battersea, SW11 5BP and depot SW11");
        assert_eq!(found.full_postcodes, vec!["SW11 5BP"]);
        assert!(found.outward_codes.is_empty());
    }

    #[test]
    fn lowercase_and_extra_spacing_are_canonicalized() {
        let found = extract("unit 4, ka1   3tn; also ka1 3tn");
        assert_eq!(found.full_postcodes, vec!["KA1 3TN"]);
        assert!(found.outward_codes.is_empty());
    }

    #[test]
    fn standalone_outward_codes_are_kept_in_order() {
        let found = extract("Depots in M1 and EH12, plus M1 again");
        assert!(found.full_postcodes.is_empty());
        assert_eq!(found.outward_codes, vec!["M1", "EH12"]);
    }

    #[test]
    fn query_outward_prefix() {
        assert_eq!(parse_outward_prefix("sw11").as_deref(), Some("SW11"));
        assert_eq!(parse_outward_prefix("SW11 5BP").as_deref(), Some("SW11"));
        assert_eq!(parse_outward_prefix("tesco"), None);
        assert_eq!(parse_outward_prefix("   "), None);
    }
}
