// SPDX-License-Identifier: Apache-2.0

use crate::group::FacetCounts;

const DEFAULT_PRIORITY: u32 = 999;

// Checked in order; the first fragment contained in the lowercased label wins.
const PRIORITY_TABLE: [(&str, u32); 15] = [
    ("ev charging", 1),
    ("pumped hydro", 2),
    ("battery", 3),
    ("storage", 3),
    ("nuclear", 4),
    ("interconnector", 5),
    ("solar", 6),
    ("wind", 7),
    ("hydro", 8),
    ("chp", 9),
    ("ocgt", 10),
    ("gas", 10),
    ("biomass", 11),
    ("coal", 12),
    ("dsr", 13),
];

#[must_use]
pub fn technology_priority(label: &str) -> u32 {
    let lowered = label.to_lowercase();
    PRIORITY_TABLE
        .iter()
        .find(|(fragment, _)| lowered.contains(fragment))
        .map_or(DEFAULT_PRIORITY, |(_, p)| *p)
}

/// Map tag for a location: best-priority technology, most frequent on ties.
#[must_use]
pub fn primary_technology(technologies: &FacetCounts) -> Option<&str> {
    technologies
        .iter()
        .enumerate()
        .min_by_key(|(idx, (label, _))| (technology_priority(label), *idx))
        .map(|(_, (label, _))| label)
}

#[must_use]
pub fn primary_company(companies: &FacetCounts) -> Option<&str> {
    companies.top()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_beats_frequency() {
        let techs = FacetCounts::tally(["Gas", "Gas", "Gas", "Battery"]);
        assert_eq!(primary_technology(&techs), Some("Battery"));
    }

    #[test]
    fn unknown_labels_fall_back_to_frequency_order() {
        let techs = FacetCounts::tally(["Thing", "Other", "Other"]);
        assert_eq!(primary_technology(&techs), Some("Other"));
        assert_eq!(primary_technology(&FacetCounts::default()), None);
    }

    #[test]
    fn pumped_hydro_outranks_hydro() {
        assert_eq!(technology_priority("Pumped Hydro Storage"), 2);
        assert_eq!(technology_priority("Hydro"), 8);
        assert_eq!(technology_priority("Demand Side Response (DSR)"), 13);
    }

    #[test]
    fn primary_company_is_most_frequent() {
        let companies = FacetCounts::tally(["A", "B", "B"]);
        assert_eq!(primary_company(&companies), Some("B"));
    }
}
