// SPDX-License-Identifier: Apache-2.0

use cmr_model::OUTWARD_LOCATIONS_FILE;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::{QueryError, QueryErrorCode};

/// Outward code → literal locations carrying it.
pub trait OutcodeIndex: Send + Sync {
    fn locations_for(&self, outward_code: &str) -> Vec<String>;
}

/// Backed by the generated `outward_locations.json`.
#[derive(Debug, Clone, Default)]
pub struct StaticOutcodeIndex {
    by_outcode: BTreeMap<String, Vec<String>>,
}

impl StaticOutcodeIndex {
    #[must_use]
    pub fn new(by_outcode: BTreeMap<String, Vec<String>>) -> Self {
        Self { by_outcode }
    }

    /// Load from a static cache directory. A missing file yields an empty index.
    pub fn load(dir: &Path) -> Result<Self, QueryError> {
        let path = dir.join(OUTWARD_LOCATIONS_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "static outward index missing; using database lookups");
                return Ok(Self::default());
            }
            Err(e) => return Err(QueryError::new(QueryErrorCode::Io, e.to_string())),
        };
        let by_outcode = serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::new(QueryErrorCode::Decode, e.to_string()))?;
        Ok(Self { by_outcode })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_outcode.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_outcode.is_empty()
    }
}

impl OutcodeIndex for StaticOutcodeIndex {
    fn locations_for(&self, outward_code: &str) -> Vec<String> {
        self.by_outcode
            .get(&outward_code.to_ascii_uppercase())
            .cloned()
            .unwrap_or_default()
    }
}

/// Direct lookup: groups carrying the outward code, plus locations whose
/// components carry it.
pub fn outward_locations_from_db(
    conn: &Connection,
    outward_code: &str,
) -> Result<Vec<String>, QueryError> {
    let mut stmt = conn.prepare_cached(
        "SELECT location FROM location_groups WHERE outward_code = ?1
         UNION
         SELECT DISTINCT location FROM components WHERE outward_code = ?1
         ORDER BY 1",
    )?;
    let rows = stmt.query_map(params![outward_code.to_ascii_uppercase()], |row| {
        row.get::<_, String>(0)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_index_is_case_insensitive_on_lookup() {
        let mut map = BTreeMap::new();
        map.insert("SW11".to_string(), vec!["Asda Battersea, SW11 5BP".to_string()]);
        let index = StaticOutcodeIndex::new(map);
        assert_eq!(index.locations_for("sw11").len(), 1);
        assert!(index.locations_for("KA1").is_empty());
    }

    #[test]
    fn missing_file_is_an_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = StaticOutcodeIndex::load(dir.path()).expect("load");
        assert!(index.is_empty());
    }
}
