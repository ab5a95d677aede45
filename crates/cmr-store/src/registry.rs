// SPDX-License-Identifier: Apache-2.0

use cmr_model::CmuRegistryEntry;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::{ComponentStore, StoreError};

/// Furthest offset persisted for one upstream resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlState {
    pub resource_id: String,
    pub max_offset: u64,
    pub completed: bool,
    pub updated_at: String,
}

impl ComponentStore {
    pub fn upsert_cmu_registry(&mut self, entries: &[CmuRegistryEntry]) -> Result<usize, StoreError> {
        let tx = self.connection_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cmu_registry (cmu_id, raw_data, last_updated) VALUES (?1, ?2, ?3)
                 ON CONFLICT(cmu_id) DO UPDATE SET
                   raw_data = excluded.raw_data, last_updated = excluded.last_updated",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.cmu_id,
                    serde_json::to_string(&entry.raw)?,
                    entry.last_updated
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn cmu_registry_entry(&self, cmu_id: &str) -> Result<Option<CmuRegistryEntry>, StoreError> {
        let row: Option<(String, String, String)> = self
            .connection()
            .query_row(
                "SELECT cmu_id, raw_data, last_updated FROM cmu_registry WHERE cmu_id = ?1",
                params![cmu_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(cmu_id, raw, last_updated)| {
            Ok(CmuRegistryEntry {
                cmu_id,
                raw: serde_json::from_str(&raw)?,
                last_updated,
            })
        })
        .transpose()
    }

    pub fn count_cmu_registry(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM cmu_registry", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn crawl_state(&self, resource_id: &str) -> Result<Option<CrawlState>, StoreError> {
        Ok(self
            .connection()
            .query_row(
                "SELECT resource_id, max_offset, completed, updated_at
                 FROM crawl_state WHERE resource_id = ?1",
                params![resource_id],
                |row| {
                    Ok(CrawlState {
                        resource_id: row.get(0)?,
                        max_offset: row.get::<_, i64>(1)?.max(0) as u64,
                        completed: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Offsets only move forward; a completed resource stays completed until reset.
    pub fn save_crawl_state(
        &self,
        resource_id: &str,
        offset: u64,
        completed: bool,
    ) -> Result<(), StoreError> {
        self.connection().execute(
            "INSERT INTO crawl_state (resource_id, max_offset, completed) VALUES (?1, ?2, ?3)
             ON CONFLICT(resource_id) DO UPDATE SET
               max_offset = MAX(crawl_state.max_offset, excluded.max_offset),
               completed = MAX(crawl_state.completed, excluded.completed),
               updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
            params![resource_id, offset as i64, completed],
        )?;
        Ok(())
    }

    pub fn reset_crawl_state(&self, resource_id: &str) -> Result<(), StoreError> {
        self.connection()
            .execute("DELETE FROM crawl_state WHERE resource_id = ?1", params![resource_id])?;
        Ok(())
    }
}
