// SPDX-License-Identifier: Apache-2.0

use cmr_model::{is_excluded_location, normalize_location};
use proptest::prelude::*;
use proptest::test_runner::Config;

proptest! {
    #![proptest_config(Config::with_cases(256))]
    #[test]
    fn normalization_is_idempotent(raw in "\\PC{0,64}") {
        let once = normalize_location(&raw);
        prop_assert_eq!(normalize_location(&once), once);
    }

    #[test]
    fn normalized_postcode_locations_have_single_spaces(
        prefix in "[A-Za-z ]{0,20}",
        area in "[A-Z]{1,2}[0-9]{1,2}",
        gap in "[ \\t]{1,4}",
        sector in "[0-9][A-Z]{2}",
    ) {
        let raw = format!("{prefix} {area}{gap}{sector}");
        let normalized = normalize_location(&raw);
        let expected_suffix = format!("{area} {sector}");
        prop_assert!(!normalized.contains("  "));
        prop_assert!(normalized.ends_with(&expected_suffix));
    }

    #[test]
    fn normalization_never_changes_exclusion_of_placeholders(raw in "(TBC|tbc|to be confirmed|TO BE CONFIRMED)[a-z ]{0,10}") {
        prop_assert!(is_excluded_location(&normalize_location(&raw)));
    }
}
