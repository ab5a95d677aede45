// SPDX-License-Identifier: Apache-2.0

use cmr_model::Component;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::schema::ensure_schema;
use crate::{StoreError, StoreErrorCode};

/// SQL predicate matching locations that never form a group: blanks, the
/// upstream placeholders and "to be confirmed" variants.
pub const EXCLUDED_LOCATION_SQL: &str = "(location IN ('', 'None', 'N/A', 'NA') \
     OR lower(location) LIKE '%tbc%' OR lower(location) LIKE '%to be confirmed%')";

const COMPONENT_COLUMNS: &str = "component_id, cmu_id, location, description, company_name, \
     technology, auction_name, delivery_year, status, component_type, derated_capacity_mw, \
     county, outward_code, latitude, longitude, raw_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertCounts {
    pub created: u64,
    pub updated: u64,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFilter {
    pub exclude_placeholders: bool,
    /// Only locations where some component still lacks an outward code.
    pub missing_admin_only: bool,
    /// Keyset cursor: strictly greater than this location.
    pub after: Option<String>,
    pub limit: Option<usize>,
}

impl LocationFilter {
    #[must_use]
    pub fn groupable() -> Self {
        Self {
            exclude_placeholders: true,
            ..Self::default()
        }
    }
}

/// Administrative fields written back by postcode enrichment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminFields {
    pub outward_code: Option<String>,
    pub county: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub struct ComponentStore {
    conn: Connection,
}

impl ComponentStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::new(StoreErrorCode::Io, e.to_string()))?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Read-only handle for the request path; the schema must already exist.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != crate::SCHEMA_VERSION {
            return Err(StoreError::new(
                StoreErrorCode::Schema,
                format!("expected schema version {}, found {version}", crate::SCHEMA_VERSION),
            ));
        }
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Insert or refresh one component keyed by `component_id`.
    pub fn upsert(&mut self, component: &Component) -> Result<UpsertOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        let outcome = upsert_in(&tx, component)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Upsert a page of components in one transaction.
    pub fn upsert_batch(&mut self, components: &[Component]) -> Result<UpsertCounts, StoreError> {
        let tx = self.conn.transaction()?;
        let mut counts = UpsertCounts::default();
        for component in components {
            counts.record(upsert_in(&tx, component)?);
        }
        tx.commit()?;
        Ok(counts)
    }

    pub fn get(&self, component_id: &str) -> Result<Option<Component>, StoreError> {
        let sql = format!("SELECT {COMPONENT_COLUMNS} FROM components WHERE component_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![component_id], component_from_row)
            .optional()?)
    }

    /// The verbatim upstream bag for one component.
    pub fn raw_data(
        &self,
        component_id: &str,
    ) -> Result<Option<BTreeMap<String, serde_json::Value>>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT raw_data FROM components WHERE component_id = ?1",
                params![component_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|text| serde_json::from_str(&text).map_err(StoreError::from))
            .transpose()
    }

    pub fn bulk_by_cmu(&self, cmu_id: &str) -> Result<Vec<Component>, StoreError> {
        self.select_where("cmu_id = ?1 ORDER BY id", cmu_id)
    }

    /// Components at one literal location, in insertion order.
    pub fn bulk_by_location(&self, location: &str) -> Result<Vec<Component>, StoreError> {
        self.select_where("location = ?1 ORDER BY id", location)
    }

    pub fn distinct_locations(&self, filter: &LocationFilter) -> Result<Vec<String>, StoreError> {
        let mut where_parts: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        if filter.exclude_placeholders {
            where_parts.push(format!("NOT {EXCLUDED_LOCATION_SQL}"));
        }
        if filter.missing_admin_only {
            where_parts.push("outward_code IS NULL".to_string());
        }
        if let Some(after) = &filter.after {
            where_parts.push(format!("location > ?{}", values.len() + 1));
            values.push(after.clone().into());
        }
        let mut sql = "SELECT DISTINCT location FROM components".to_string();
        if !where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }
        sql.push_str(" ORDER BY location");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Write administrative fields to every component at a literal location.
    /// Coordinates only fill gaps; outward code and county always follow the
    /// latest resolution so one location never carries two answers.
    pub fn set_admin_fields(&mut self, location: &str, fields: &AdminFields) -> Result<usize, StoreError> {
        let changed = self.conn.execute(
            "UPDATE components
             SET outward_code = ?2,
                 county = ?3,
                 latitude = COALESCE(latitude, ?4),
                 longitude = COALESCE(longitude, ?5),
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE location = ?1",
            params![
                location,
                fields.outward_code,
                fields.county,
                fields.latitude,
                fields.longitude
            ],
        )?;
        Ok(changed)
    }

    pub fn count_components(&self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM components")
    }

    /// Components whose location can be grouped; the activation gate's denominator.
    pub fn count_groupable_components(&self) -> Result<u64, StoreError> {
        self.count(&format!(
            "SELECT COUNT(*) FROM components WHERE NOT {EXCLUDED_LOCATION_SQL}"
        ))
    }

    pub fn count_cmus(&self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(DISTINCT cmu_id) FROM components WHERE cmu_id != ''")
    }

    /// Component count per non-empty delivery year.
    pub fn year_counts(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT delivery_year, COUNT(*) FROM components
             WHERE delivery_year != '' GROUP BY delivery_year",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (year, count) = row?;
            out.insert(year, count.max(0) as u64);
        }
        Ok(out)
    }

    /// Most populated auctions, largest first.
    pub fn top_auction_counts(&self, limit: usize) -> Result<Vec<(String, u64)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT auction_name, COUNT(*) AS n FROM components
             WHERE auction_name != '' GROUP BY auction_name
             ORDER BY n DESC, auction_name ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recent component write, as stored (`%Y-%m-%dT%H:%M:%SZ`).
    pub fn latest_update(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT MAX(updated_at) FROM components", [], |row| row.get(0))?)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO store_meta (k, v) VALUES (?1, ?2)
             ON CONFLICT(k) DO UPDATE SET v = excluded.v",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT v FROM store_meta WHERE k = ?1", params![key], |row| row.get(0))
            .optional()?)
    }

    fn select_where(&self, clause: &str, value: &str) -> Result<Vec<Component>, StoreError> {
        let sql = format!("SELECT {COMPONENT_COLUMNS} FROM components WHERE {clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![value], component_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count(&self, sql: &str) -> Result<u64, StoreError> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

fn upsert_in(conn: &Connection, c: &Component) -> Result<UpsertOutcome, StoreError> {
    let existed = conn
        .query_row(
            "SELECT 1 FROM components WHERE component_id = ?1",
            params![c.component_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    let raw = serde_json::to_string(&c.raw)?;
    // Derived admin fields survive a refresh only while the location is unchanged.
    conn.execute(
        "INSERT INTO components (
           component_id, cmu_id, location, description, company_name, technology,
           auction_name, delivery_year, status, component_type, derated_capacity_mw,
           county, outward_code, latitude, longitude, raw_data
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(component_id) DO UPDATE SET
           cmu_id = excluded.cmu_id,
           description = excluded.description,
           company_name = excluded.company_name,
           technology = excluded.technology,
           auction_name = excluded.auction_name,
           delivery_year = excluded.delivery_year,
           status = excluded.status,
           component_type = excluded.component_type,
           derated_capacity_mw = excluded.derated_capacity_mw,
           county = CASE WHEN components.location = excluded.location
                         THEN COALESCE(excluded.county, components.county) ELSE excluded.county END,
           outward_code = CASE WHEN components.location = excluded.location
                         THEN COALESCE(excluded.outward_code, components.outward_code)
                         ELSE excluded.outward_code END,
           latitude = COALESCE(excluded.latitude, components.latitude),
           longitude = COALESCE(excluded.longitude, components.longitude),
           location = excluded.location,
           raw_data = excluded.raw_data,
           updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        params![
            c.component_id,
            c.cmu_id,
            c.location,
            c.description,
            c.company_name,
            c.technology,
            c.auction_name,
            c.delivery_year,
            c.status,
            c.component_type,
            c.derated_capacity_mw,
            c.county,
            c.outward_code,
            c.latitude,
            c.longitude,
            raw
        ],
    )?;
    Ok(if existed {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Created
    })
}

pub(crate) fn component_from_row(row: &Row<'_>) -> rusqlite::Result<Component> {
    let raw_text: String = row.get(15)?;
    let raw = serde_json::from_str(&raw_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?;
    Ok(Component {
        component_id: row.get(0)?,
        cmu_id: row.get(1)?,
        location: row.get(2)?,
        description: row.get(3)?,
        company_name: row.get(4)?,
        technology: row.get(5)?,
        auction_name: row.get(6)?,
        delivery_year: row.get(7)?,
        status: row.get(8)?,
        component_type: row.get(9)?,
        derated_capacity_mw: row.get(10)?,
        county: row.get(11)?,
        outward_code: row.get(12)?,
        latitude: row.get(13)?,
        longitude: row.get(14)?,
        raw,
    })
}
