// SPDX-License-Identifier: Apache-2.0

use cmr_model::{FreshnessBaseline, HistoryEntry, HISTORY_LIMIT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::{FreshnessError, FreshnessErrorCode};

pub const BASELINE_FILE: &str = "freshness_baseline.json";
pub const HISTORY_FILE: &str = "freshness_history.json";

/// Baseline and history JSON files under one state directory. Writes are
/// atomic; reads take no lock.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_baseline(&self) -> Result<Option<FreshnessBaseline>, FreshnessError> {
        read_json(&self.dir.join(BASELINE_FILE))
    }

    pub fn save_baseline(&self, baseline: &FreshnessBaseline) -> Result<(), FreshnessError> {
        write_json(&self.dir, BASELINE_FILE, baseline)
    }

    pub fn load_history(&self) -> Result<Vec<HistoryEntry>, FreshnessError> {
        Ok(read_json(&self.dir.join(HISTORY_FILE))?.unwrap_or_default())
    }

    /// Append and keep only the newest entries.
    pub fn append_history(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>, FreshnessError> {
        let mut history = self.load_history()?;
        history.push(entry);
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
        write_json(&self.dir, HISTORY_FILE, &history)?;
        Ok(history)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FreshnessError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FreshnessError::new(FreshnessErrorCode::Io, format!("{}: {e}", path.display()))),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| FreshnessError::new(FreshnessErrorCode::Decode, format!("{}: {e}", path.display())))
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), FreshnessError> {
    std::fs::create_dir_all(dir).map_err(|e| FreshnessError::new(FreshnessErrorCode::Io, e.to_string()))?;
    let bytes = cmr_core::canonical::stable_json_pretty(value)
        .map_err(|e| FreshnessError::new(FreshnessErrorCode::Decode, e.to_string()))?;
    cmr_core::write_atomic_file(&dir.join(name), &bytes)
        .map_err(|e| FreshnessError::new(FreshnessErrorCode::Io, e.to_string()))
}
