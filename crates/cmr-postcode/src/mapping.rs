// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::client::{OutcodeInfo, PostcodeInfo};
use crate::{PostcodeError, PostcodeErrorCode};

pub const POSTCODE_MAPPING_FILE: &str = "postcode_mapping.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingMetadata {
    pub generated_at: String,
    pub locations_scanned: u64,
    pub api_calls: u64,
}

/// Persistent resolution cache; a second pass over the same locations makes
/// no network calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostcodeMapping {
    #[serde(default)]
    pub full_postcodes: BTreeMap<String, PostcodeInfo>,
    #[serde(default)]
    pub outward_codes: BTreeMap<String, OutcodeInfo>,
    #[serde(default)]
    pub outcode_to_county: BTreeMap<String, String>,
    #[serde(default)]
    pub outcode_to_region: BTreeMap<String, String>,
    /// Codes the service answered as unknown; never retried.
    #[serde(default)]
    pub invalid: BTreeSet<String>,
    #[serde(default)]
    pub metadata: MappingMetadata,
}

impl PostcodeMapping {
    /// A missing file is an empty mapping.
    pub fn load(path: &Path) -> Result<Self, PostcodeError> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| PostcodeError::new(PostcodeErrorCode::Decode, e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PostcodeError::new(PostcodeErrorCode::Io, e.to_string())),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PostcodeError> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| PostcodeError::new(PostcodeErrorCode::Decode, e.to_string()))?;
        cmr_core::write_atomic_file(path, &bytes)
            .map_err(|e| PostcodeError::new(PostcodeErrorCode::Io, e.to_string()))
    }

    pub fn record_postcode(&mut self, info: PostcodeInfo) {
        if let Some(county) = &info.county {
            self.outcode_to_county
                .entry(info.outcode.clone())
                .or_insert_with(|| county.clone());
        }
        if let Some(region) = &info.region {
            self.outcode_to_region
                .entry(info.outcode.clone())
                .or_insert_with(|| region.clone());
        }
        self.full_postcodes.insert(info.postcode.clone(), info);
    }

    pub fn record_outcode(&mut self, info: OutcodeInfo) {
        if let Some(county) = info.county() {
            self.outcode_to_county
                .insert(info.outcode.clone(), county.to_string());
        }
        if let Some(region) = &info.region {
            self.outcode_to_region
                .insert(info.outcode.clone(), region.clone());
        }
        self.outward_codes.insert(info.outcode.clone(), info);
    }

    pub fn mark_invalid(&mut self, code: &str) {
        self.invalid.insert(code.to_string());
    }

    #[must_use]
    pub fn is_invalid(&self, code: &str) -> bool {
        self.invalid.contains(code)
    }
}
