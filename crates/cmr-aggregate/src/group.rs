// SPDX-License-Identifier: Apache-2.0

use cmr_model::{
    has_year_token, trim_field, ActiveYearTokens, CapacityConfidence, Component, FacetCounts, LocationGroup,
    CAPACITY_SOURCE_DERATED, MAX_AUCTION_YEARS, MAX_DESCRIPTIONS,
};

/// Materialize the group for one location from its components in insertion
/// order. `None` when there is nothing to group.
#[must_use]
pub fn build_location_group(
    location: &str,
    components: &[Component],
    tokens: &ActiveYearTokens,
) -> Option<LocationGroup> {
    if components.is_empty() {
        return None;
    }

    let mut descriptions: Vec<String> = Vec::with_capacity(MAX_DESCRIPTIONS);
    for c in components {
        if descriptions.len() == MAX_DESCRIPTIONS {
            break;
        }
        let d = trim_field(&c.description);
        if !d.is_empty() && !descriptions.iter().any(|x| x == d) {
            descriptions.push(d.to_string());
        }
    }

    let technologies = FacetCounts::tally(components.iter().map(|c| c.technology.as_str()));
    let companies = FacetCounts::tally(components.iter().map(|c| c.company_name.as_str()));

    let mut auction_years: Vec<String> = components
        .iter()
        .map(|c| trim_field(&c.auction_name))
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    auction_years.sort_unstable_by(|a, b| b.cmp(a));
    auction_years.dedup();
    auction_years.truncate(MAX_AUCTION_YEARS);

    let mut cmu_ids: Vec<String> = components
        .iter()
        .map(|c| trim_field(&c.cmu_id))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    cmu_ids.sort_unstable();
    cmu_ids.dedup();

    let capacities: Vec<f64> = components.iter().filter_map(|c| c.derated_capacity_mw).collect();
    let capacity = capacities.iter().fold(0.0_f64, |acc, v| acc + v).max(0.0);

    let representative = components
        .iter()
        .find(|c| c.has_coordinates())
        .unwrap_or(&components[0]);

    Some(LocationGroup {
        location: location.to_string(),
        component_count: components.len() as u64,
        descriptions,
        technologies,
        companies,
        is_active: tokens.is_active(&auction_years),
        auction_years,
        cmu_ids,
        displayed_capacity_mw: capacity,
        normalized_capacity_mw: capacity,
        capacity_confidence: CapacityConfidence::from_coverage(
            capacities.len() as u64,
            components.len() as u64,
        ),
        capacity_source: CAPACITY_SOURCE_DERATED.to_string(),
        latitude: representative.latitude,
        longitude: representative.longitude,
        county: representative.county.clone(),
        outward_code: representative.outward_code.clone(),
        representative_component_id: Some(representative.component_id.clone()),
    })
}

/// Auction labels without a `YYYY-YY` token; sorting them lexicographically
/// says nothing about chronology.
#[must_use]
pub fn unrecognized_auction_labels(group: &LocationGroup) -> Vec<&str> {
    group
        .auction_years
        .iter()
        .map(String::as_str)
        .filter(|label| !has_year_token(label))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn component(id: &str, tech: &str, company: &str, auction: &str) -> Component {
        Component {
            component_id: id.to_string(),
            cmu_id: format!("CMU-{company}"),
            location: "Imperial College London".to_string(),
            description: String::new(),
            company_name: company.to_string(),
            technology: tech.to_string(),
            auction_name: auction.to_string(),
            delivery_year: String::new(),
            status: String::new(),
            component_type: String::new(),
            derated_capacity_mw: None,
            county: None,
            outward_code: None,
            latitude: None,
            longitude: None,
            raw: BTreeMap::new(),
        }
    }

    fn tokens() -> ActiveYearTokens {
        ActiveYearTokens::new(vec!["2024-25".to_string(), "2025-26".to_string()])
    }

    #[test]
    fn imperial_college_scenario() {
        let components = vec![
            component("1", "Gas", "A", "T-4 2024-25"),
            component("2", "Gas", "A", "T-1 2022-23"),
            component("3", "Battery", "B", "T-4 2024-25"),
        ];
        let g = build_location_group("Imperial College London", &components, &tokens())
            .expect("group");
        assert_eq!(g.component_count, 3);
        assert_eq!(g.technologies.iter().collect::<Vec<_>>(), vec![("Gas", 2), ("Battery", 1)]);
        assert_eq!(g.companies.iter().collect::<Vec<_>>(), vec![("A", 2), ("B", 1)]);
        assert_eq!(g.auction_years, vec!["T-4 2024-25", "T-1 2022-23"]);
        assert!(g.is_active);
        assert_eq!(g.cmu_ids, vec!["CMU-A", "CMU-B"]);
        assert_eq!(g.capacity_confidence, CapacityConfidence::None);
        g.check_invariants(&tokens()).expect("invariants");
    }

    #[test]
    fn descriptions_and_auctions_are_truncated() {
        let mut components = Vec::new();
        for i in 0..8 {
            let mut c = component(&i.to_string(), "Solar", "A", &format!("T-4 20{}-{}", 10 + i, 11 + i));
            c.description = format!("desc {}", i % 5);
            components.push(c);
        }
        let g = build_location_group("X", &components, &tokens()).expect("group");
        assert_eq!(g.descriptions, vec!["desc 0", "desc 1", "desc 2"]);
        assert_eq!(g.auction_years.len(), MAX_AUCTION_YEARS);
        assert_eq!(g.auction_years[0], "T-4 2017-18");
        assert!(!g.is_active);
    }

    #[test]
    fn capacity_and_representative() {
        let mut a = component("1", "Wind", "A", "T-4 2024-25");
        a.derated_capacity_mw = Some(1.5);
        let mut b = component("2", "", "", "");
        b.latitude = Some(51.5);
        b.longitude = Some(-0.1);
        b.outward_code = Some("SW7".to_string());
        let g = build_location_group("X", &[a, b], &tokens()).expect("group");
        assert_eq!(g.normalized_capacity_mw, 1.5);
        assert_eq!(g.capacity_confidence, CapacityConfidence::Medium);
        assert_eq!(g.representative_component_id.as_deref(), Some("2"));
        assert_eq!(g.outward_code.as_deref(), Some("SW7"));
        assert_eq!(g.technologies.get("Unknown"), Some(1));
        g.check_invariants(&tokens()).expect("invariants");
    }

    #[test]
    fn labels_without_year_token_are_flagged() {
        let components = vec![component("1", "Gas", "A", "Early Auction"), component("2", "Gas", "A", "T-4 2024-25")];
        let g = build_location_group("X", &components, &tokens()).expect("group");
        assert_eq!(unrecognized_auction_labels(&g), vec!["Early Auction"]);
        assert!(build_location_group("X", &[], &tokens()).is_none());
    }
}
