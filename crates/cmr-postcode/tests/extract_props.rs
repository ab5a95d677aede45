// SPDX-License-Identifier: Apache-2.0

use cmr_postcode::{extract, FULL_POSTCODE_PATTERN};
use proptest::prelude::*;
use regex::Regex;

fn anchored_full() -> Regex {
    let body = FULL_POSTCODE_PATTERN.trim_start_matches(r"\b").trim_end_matches(r"\b");
    Regex::new(&format!("^{body}$")).expect("pattern")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn extraction_results_are_well_formed(text in "[A-Za-z0-9 ,]{0,60}") {
        let full = anchored_full();
        let found = extract(&text);
        for postcode in &found.full_postcodes {
            prop_assert!(full.is_match(postcode), "{postcode}");
            prop_assert_eq!(postcode.matches(' ').count(), 1);
        }
        for outward in &found.outward_codes {
            prop_assert!(!found.full_postcodes.iter().any(|p| p.starts_with(outward.as_str())));
        }
    }

    #[test]
    fn embedded_postcodes_are_found(
        prefix in "[a-z ]{0,12}",
        area in "[A-Z]{1,2}",
        district in 1u8..=9,
        sector in 0u8..=9,
        unit in "[A-Z]{2}",
        suffix in "[a-z ]{0,12}",
    ) {
        let text = format!("{prefix} {area}{district}  {sector}{unit} {suffix}");
        let found = extract(&text);
        let expected = format!("{area}{district} {sector}{unit}");
        prop_assert!(found.full_postcodes.contains(&expected), "{text:?} -> {found:?}");
        let outward = format!("{area}{district}");
        prop_assert!(!found.outward_codes.contains(&outward));
    }
}

#[test]
fn duplicates_collapse_in_first_seen_order() {
    let found = extract("EH1 1AA, G2 3BB and eh1  1aa");
    assert_eq!(found.full_postcodes, vec!["EH1 1AA", "G2 3BB"]);
}
