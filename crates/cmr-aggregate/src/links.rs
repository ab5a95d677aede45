// SPDX-License-Identifier: Apache-2.0

use cmr_core::{fields, JobLog, JobStage};
use cmr_model::CompanyLinks;
use cmr_store::{upsert_company_links, ComponentStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use crate::builder::FailedBatch;
use crate::AggregateError;

pub const COMPANY_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompanyLinksReport {
    pub companies: u64,
    pub links: u64,
    pub batches: u64,
    pub failed_batches: Vec<FailedBatch>,
    pub elapsed_ms: u64,
    pub events: JobLog,
}

/// Rebuild the per-company auction index from the component table.
pub fn build_company_links(
    store: &mut ComponentStore,
    full_rebuild: bool,
) -> Result<CompanyLinksReport, AggregateError> {
    let started = Instant::now();
    let mut report = CompanyLinksReport::default();
    let mut per_company: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
    {
        let mut stmt = store.connection().prepare(
            "SELECT company_name, auction_name, COUNT(*) FROM components
             WHERE company_name != '' AND auction_name != ''
             GROUP BY company_name, auction_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (company, auction, count) = row?;
            per_company
                .entry(company)
                .or_default()
                .push((auction, count.max(0) as u64));
        }
    }
    report.events.emit(
        JobStage::Fetch,
        "companies_grouped",
        fields([("companies", per_company.len().to_string())]),
    );

    if full_rebuild {
        store.connection().execute("DELETE FROM company_links", [])?;
    }

    let companies: Vec<(String, Vec<(String, u64)>)> = per_company.into_iter().collect();
    for (index, chunk) in companies.chunks(COMPANY_BATCH_SIZE).enumerate() {
        report.batches += 1;
        let result = write_links_batch(store, chunk);
        match result {
            Ok(links) => {
                report.companies += chunk.len() as u64;
                report.links += links;
            }
            Err(e) => {
                warn!(batch = index, error = %e, "company links batch failed");
                report.failed_batches.push(FailedBatch::new(
                    index as u64,
                    chunk.first().map(|(c, _)| c.as_str()),
                    chunk.last().map(|(c, _)| c.as_str()),
                    e.to_string(),
                ));
            }
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report.events.emit(
        JobStage::Finalize,
        "company_links_finished",
        fields([
            ("companies", report.companies.to_string()),
            ("links", report.links.to_string()),
        ]),
    );
    info!(companies = report.companies, links = report.links, "company links built");
    Ok(report)
}

fn write_links_batch(
    store: &mut ComponentStore,
    chunk: &[(String, Vec<(String, u64)>)],
) -> Result<u64, AggregateError> {
    let tx = store.connection_mut().transaction()?;
    let mut links_written = 0_u64;
    for (company, auctions) in chunk {
        let links = CompanyLinks::from_counts(company, auctions.clone());
        links_written += links.auction_count;
        upsert_company_links(&tx, &links)?;
    }
    tx.commit()?;
    Ok(links_written)
}
