// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use std::sync::OnceLock;

const POSTCODE_SPACING_PATTERN: &str = r"([A-Z]{1,2}\d{1,2}[A-Z]?)\s+(\d[A-Z]{2})";

const EXCLUDED_LITERALS: [&str; 4] = ["", "None", "N/A", "NA"];
const EXCLUDED_FRAGMENTS: [&str; 2] = ["tbc", "to be confirmed"];

fn postcode_spacing() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(POSTCODE_SPACING_PATTERN).ok())
        .as_ref()
}

/// Collapse whitespace runs to one space, trim, and single-space UK postcodes
/// (`"KA1  3TN"` becomes `"KA1 3TN"`). Idempotent.
#[must_use]
pub fn normalize_location(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match postcode_spacing() {
        Some(re) => re.replace_all(&collapsed, "$1 $2").into_owned(),
        None => collapsed,
    }
}

/// Placeholder locations that never form a location group.
#[must_use]
pub fn is_excluded_location(location: &str) -> bool {
    let trimmed = location.trim();
    if EXCLUDED_LITERALS.contains(&trimmed) {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    EXCLUDED_FRAGMENTS.iter().any(|f| lowered.contains(f))
}
