// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::location::normalize_location;

pub const COMPONENT_ID_FIELD: &str = "Component ID";
pub const CMU_ID_FIELD: &str = "CMU ID";

const LOCATION_FIELDS: [&str; 2] = ["Location and Post Code", "Location"];
const DESCRIPTION_FIELDS: [&str; 2] = ["Description of CMU Components", "Description"];
const COMPANY_FIELDS: [&str; 2] = ["Company Name", "Name of Applicant"];
const TECHNOLOGY_FIELDS: [&str; 3] = [
    "Generating Technology Class",
    "Technology Type",
    "Primary Fuel of Component",
];
const AUCTION_FIELDS: [&str; 1] = ["Auction Name"];
const DELIVERY_YEAR_FIELDS: [&str; 1] = ["Delivery Year"];
const STATUS_FIELDS: [&str; 1] = ["Status"];
const TYPE_FIELDS: [&str; 2] = ["Type", "Component Type"];
const CAPACITY_FIELDS: [&str; 3] = [
    "De-Rated Capacity",
    "Adjusted De-rated Capacity (MW)",
    "Derated Capacity (MW)",
];

/// Flat record exactly as returned by the upstream datastore.
pub type UpstreamRecord = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    MissingField(&'static str),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "upstream record missing `{name}`"),
        }
    }
}

impl std::error::Error for RecordError {}

/// One capacity-market component row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub component_id: String,
    pub cmu_id: String,
    pub location: String,
    pub description: String,
    pub company_name: String,
    pub technology: String,
    pub auction_name: String,
    pub delivery_year: String,
    pub status: String,
    pub component_type: String,
    pub derated_capacity_mw: Option<f64>,
    pub county: Option<String>,
    pub outward_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Upstream fields retained verbatim.
    pub raw: BTreeMap<String, Value>,
}

impl Component {
    /// Build a component from an upstream record. The location is normalized;
    /// every other text field is trimmed.
    pub fn from_upstream(record: &UpstreamRecord) -> Result<Self, RecordError> {
        let component_id = field_text(record, &[COMPONENT_ID_FIELD]);
        if component_id.is_empty() {
            return Err(RecordError::MissingField(COMPONENT_ID_FIELD));
        }
        let cmu_id = field_text(record, &[CMU_ID_FIELD]);
        if cmu_id.is_empty() {
            return Err(RecordError::MissingField(CMU_ID_FIELD));
        }
        Ok(Self {
            component_id,
            cmu_id,
            location: normalize_location(&field_text(record, &LOCATION_FIELDS)),
            description: field_text(record, &DESCRIPTION_FIELDS),
            company_name: field_text(record, &COMPANY_FIELDS),
            technology: field_text(record, &TECHNOLOGY_FIELDS),
            auction_name: field_text(record, &AUCTION_FIELDS),
            delivery_year: field_text(record, &DELIVERY_YEAR_FIELDS),
            status: field_text(record, &STATUS_FIELDS),
            component_type: field_text(record, &TYPE_FIELDS),
            derated_capacity_mw: field_number(record, &CAPACITY_FIELDS),
            county: None,
            outward_code: None,
            latitude: None,
            longitude: None,
            raw: record.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    /// The CMU id recorded in the raw bag, when present and non-blank.
    #[must_use]
    pub fn raw_cmu_id(&self) -> Option<String> {
        self.raw
            .get(CMU_ID_FIELD)
            .map(value_text)
            .filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Upstream CMU-level metadata, read-only cross reference for aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmuRegistryEntry {
    pub cmu_id: String,
    pub raw: BTreeMap<String, Value>,
    pub last_updated: String,
}

fn field_text(record: &UpstreamRecord, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .map(value_text)
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

fn field_number(record: &UpstreamRecord, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| record.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    })
    .filter(|v| v.is_finite())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> UpstreamRecord {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn maps_aliases_and_keeps_raw_bag() {
        let r = record(json!({
            "_id": 7,
            "Component ID": "C-1",
            "CMU ID": " CMU1 ",
            "Location and Post Code": "Depot  KA1  3TN",
            "Name of Applicant": "Acme",
            "Primary Fuel of Component": "Gas",
            "Auction Name": "T-4 2024-25",
            "De-Rated Capacity": "1,234.5"
        }));
        let c = Component::from_upstream(&r).expect("component");
        assert_eq!(c.cmu_id, "CMU1");
        assert_eq!(c.location, "Depot KA1 3TN");
        assert_eq!(c.company_name, "Acme");
        assert_eq!(c.technology, "Gas");
        assert_eq!(c.derated_capacity_mw, Some(1234.5));
        assert_eq!(c.raw.get("_id"), Some(&json!(7)));
        assert_eq!(c.raw_cmu_id().as_deref(), Some("CMU1"));
    }

    #[test]
    fn missing_identifiers_are_rejected() {
        let err = Component::from_upstream(&record(json!({"CMU ID": "X"}))).expect_err("no id");
        assert_eq!(err, RecordError::MissingField(COMPONENT_ID_FIELD));
        let err =
            Component::from_upstream(&record(json!({"Component ID": 12, "CMU ID": ""}))).expect_err("no cmu");
        assert_eq!(err, RecordError::MissingField(CMU_ID_FIELD));
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let c = Component::from_upstream(&record(json!({"Component ID": 12, "CMU ID": "X"})))
            .expect("component");
        assert_eq!(c.component_id, "12");
        assert_eq!(c.derated_capacity_mw, None);
    }
}
