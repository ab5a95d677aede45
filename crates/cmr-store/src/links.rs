// SPDX-License-Identifier: Apache-2.0

use cmr_model::CompanyLinks;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::StoreError;

pub fn upsert_company_links(conn: &Connection, links: &CompanyLinks) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO company_links (company_name, auction_links, component_count, auction_count)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(company_name) DO UPDATE SET
           auction_links = excluded.auction_links,
           component_count = excluded.component_count,
           auction_count = excluded.auction_count,
           updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        params![
            links.company_name,
            serde_json::to_string(&links.auction_links)?,
            links.component_count as i64,
            links.auction_count as i64
        ],
    )?;
    Ok(())
}

pub fn read_company_links(
    conn: &Connection,
    company_name: &str,
) -> Result<Option<CompanyLinks>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT company_name, auction_links, component_count, auction_count
             FROM company_links WHERE company_name = ?1",
            params![company_name],
            |row| {
                let links: String = row.get(1)?;
                Ok(CompanyLinks {
                    company_name: row.get(0)?,
                    auction_links: serde_json::from_str(&links).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?,
                    component_count: row.get::<_, i64>(2)?.max(0) as u64,
                    auction_count: row.get::<_, i64>(3)?.max(0) as u64,
                })
            },
        )
        .optional()?)
}
