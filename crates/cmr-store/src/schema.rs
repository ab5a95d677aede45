// SPDX-License-Identifier: Apache-2.0

use rusqlite::Connection;

use crate::{StoreError, StoreErrorCode};

pub const SCHEMA_VERSION: i64 = 1;

const PRAGMAS: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA foreign_keys=ON;
    PRAGMA temp_store=MEMORY;
    PRAGMA cache_size=-32000;
";

const TABLES: &str = "
    CREATE TABLE IF NOT EXISTS components (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      component_id TEXT NOT NULL UNIQUE,
      cmu_id TEXT NOT NULL,
      location TEXT NOT NULL DEFAULT '',
      description TEXT NOT NULL DEFAULT '',
      company_name TEXT NOT NULL DEFAULT '',
      technology TEXT NOT NULL DEFAULT '',
      auction_name TEXT NOT NULL DEFAULT '',
      delivery_year TEXT NOT NULL DEFAULT '',
      status TEXT NOT NULL DEFAULT '',
      component_type TEXT NOT NULL DEFAULT '',
      derated_capacity_mw REAL,
      county TEXT,
      outward_code TEXT,
      latitude REAL,
      longitude REAL,
      raw_data TEXT NOT NULL DEFAULT '{}',
      created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
      updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_components_cmu ON components(cmu_id);
    CREATE INDEX IF NOT EXISTS idx_components_location ON components(location);
    CREATE INDEX IF NOT EXISTS idx_components_company ON components(company_name);
    CREATE INDEX IF NOT EXISTS idx_components_delivery_year ON components(delivery_year);

    CREATE TABLE IF NOT EXISTS cmu_registry (
      cmu_id TEXT PRIMARY KEY,
      raw_data TEXT NOT NULL,
      last_updated TEXT NOT NULL
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS location_groups (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      location TEXT NOT NULL UNIQUE,
      component_count INTEGER NOT NULL CHECK (component_count >= 1),
      descriptions TEXT NOT NULL DEFAULT '[]',
      technologies TEXT NOT NULL DEFAULT '{}',
      companies TEXT NOT NULL DEFAULT '{}',
      auction_years TEXT NOT NULL DEFAULT '[]',
      cmu_ids TEXT NOT NULL DEFAULT '[]',
      displayed_capacity_mw REAL NOT NULL DEFAULT 0 CHECK (displayed_capacity_mw >= 0),
      normalized_capacity_mw REAL NOT NULL DEFAULT 0 CHECK (normalized_capacity_mw >= 0),
      capacity_confidence TEXT NOT NULL DEFAULT 'none',
      capacity_source TEXT NOT NULL DEFAULT '',
      is_active INTEGER NOT NULL DEFAULT 0,
      latitude REAL,
      longitude REAL,
      county TEXT,
      outward_code TEXT,
      representative_component_id TEXT,
      primary_technology TEXT,
      primary_company TEXT,
      updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );
    CREATE INDEX IF NOT EXISTS idx_location_groups_active ON location_groups(is_active);
    CREATE INDEX IF NOT EXISTS idx_location_groups_outward ON location_groups(outward_code);
    CREATE INDEX IF NOT EXISTS idx_location_groups_capacity ON location_groups(normalized_capacity_mw);
    CREATE INDEX IF NOT EXISTS idx_location_groups_count ON location_groups(component_count);

    CREATE TABLE IF NOT EXISTS company_links (
      company_name TEXT PRIMARY KEY,
      auction_links TEXT NOT NULL,
      component_count INTEGER NOT NULL,
      auction_count INTEGER NOT NULL,
      updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS crawl_state (
      resource_id TEXT PRIMARY KEY,
      max_offset INTEGER NOT NULL,
      completed INTEGER NOT NULL DEFAULT 0,
      updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS store_meta (
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    ) WITHOUT ROWID;
";

/// Create missing tables and stamp the schema version. A database written by a
/// newer schema is refused.
pub fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::new(
            StoreErrorCode::Schema,
            format!("database schema version {found} is newer than supported {SCHEMA_VERSION}"),
        ));
    }
    conn.execute_batch(PRAGMAS)?;
    conn.execute_batch(TABLES)?;
    if found < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version={SCHEMA_VERSION};"))?;
    }
    Ok(())
}
