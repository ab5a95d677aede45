// SPDX-License-Identifier: Apache-2.0

use cmr_core::{fields, JobLog, JobStage};
use cmr_model::{CmuRegistryEntry, Component, UpstreamRecord, CMU_ID_FIELD};
use cmr_store::ComponentStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, Sleeper};
use crate::upstream::{
    DatastorePage, DatastoreQuery, UpstreamApi, CMU_RESOURCE_ID, COMPONENT_RESOURCE_ID,
};
use crate::{IngestError, IngestErrorCode};

pub const DEFAULT_PAGE_LIMIT: u64 = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
const RETRY_BASE: Duration = Duration::from_secs(1);
const MAX_MALFORMED_SAMPLES: usize = 10;

/// Upstream resources the crawler knows how to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Components,
    Cmu,
}

impl Resource {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "components" | "component" => Some(Self::Components),
            "cmu" | "cmus" | "registry" => Some(Self::Cmu),
            _ => None,
        }
    }

    #[must_use]
    pub const fn resource_id(self) -> &'static str {
        match self {
            Self::Components => COMPONENT_RESOURCE_ID,
            Self::Cmu => CMU_RESOURCE_ID,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub resource_id: String,
    pub limit: u64,
    /// Pause between page requests.
    pub sleep: Duration,
    pub max_retries: u32,
    pub max_pages: Option<u64>,
    /// Forget the persisted offset and start from zero.
    pub restart: bool,
    /// Upstream full-text filter. Filtered crawls keep their own offset.
    pub q: Option<String>,
}

impl CrawlOptions {
    #[must_use]
    pub fn for_resource(resource: Resource) -> Self {
        Self {
            resource_id: resource.resource_id().to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state_key(&self) -> String {
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => format!("{}?q={q}", self.resource_id),
            None => self.resource_id.clone(),
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            resource_id: COMPONENT_RESOURCE_ID.to_string(),
            limit: DEFAULT_PAGE_LIMIT,
            sleep: Duration::from_secs(1),
            max_retries: DEFAULT_MAX_RETRIES,
            max_pages: None,
            restart: false,
            q: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedSample {
    pub offset: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub resource_id: String,
    pub start_offset: u64,
    /// Offset the next run resumes from.
    pub next_offset: u64,
    pub pages: u64,
    pub records_seen: u64,
    pub created: u64,
    pub updated: u64,
    /// Registry rows written (CMU crawl only).
    pub written: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub malformed_samples: Vec<MalformedSample>,
    pub retries: u64,
    pub upstream_total: Option<u64>,
    pub completed: bool,
    /// Set when the run stopped on an upstream failure; the offset reached is kept.
    pub aborted: Option<String>,
    pub elapsed_ms: u64,
    pub events: JobLog,
}

impl CrawlReport {
    fn note_malformed(&mut self, offset: u64, message: String) {
        self.malformed += 1;
        if self.malformed_samples.len() < MAX_MALFORMED_SAMPLES {
            self.malformed_samples.push(MalformedSample { offset, message });
        }
    }
}

/// Pull the component resource into the store, one transaction per page.
pub fn crawl_components(
    api: &dyn UpstreamApi,
    store: &mut ComponentStore,
    sleeper: &dyn Sleeper,
    opts: &CrawlOptions,
) -> Result<CrawlReport, IngestError> {
    let mut seen: HashSet<String> = HashSet::new();
    run_pages(api, store, sleeper, opts, |store, offset, records, report| {
        let mut batch = Vec::with_capacity(records.len());
        for record in records {
            match Component::from_upstream(&record) {
                Ok(component) => {
                    if seen.insert(component.component_id.clone()) {
                        batch.push(component);
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(e) => report.note_malformed(offset, e.to_string()),
            }
        }
        let counts = store.upsert_batch(&batch)?;
        report.created += counts.created;
        report.updated += counts.updated;
        Ok(())
    })
}

/// Pull the CMU resource into the registry table.
pub fn crawl_cmu_registry(
    api: &dyn UpstreamApi,
    store: &mut ComponentStore,
    sleeper: &dyn Sleeper,
    opts: &CrawlOptions,
) -> Result<CrawlReport, IngestError> {
    let mut seen: HashSet<String> = HashSet::new();
    run_pages(api, store, sleeper, opts, |store, offset, records, report| {
        let now = chrono::Utc::now().to_rfc3339();
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let cmu_id = match record.get(CMU_ID_FIELD) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            if cmu_id.is_empty() {
                report.note_malformed(offset, format!("upstream record missing `{CMU_ID_FIELD}`"));
                continue;
            }
            if !seen.insert(cmu_id.clone()) {
                report.duplicates += 1;
                continue;
            }
            entries.push(CmuRegistryEntry {
                cmu_id,
                raw: record.into_iter().collect(),
                last_updated: now.clone(),
            });
        }
        report.written += store.upsert_cmu_registry(&entries)? as u64;
        Ok(())
    })
}

fn run_pages<F>(
    api: &dyn UpstreamApi,
    store: &mut ComponentStore,
    sleeper: &dyn Sleeper,
    opts: &CrawlOptions,
    mut handle: F,
) -> Result<CrawlReport, IngestError>
where
    F: FnMut(&mut ComponentStore, u64, Vec<UpstreamRecord>, &mut CrawlReport) -> Result<(), IngestError>,
{
    let started = Instant::now();
    let limit = opts.limit.max(1);
    let key = opts.state_key();
    let backoff = Backoff::new(RETRY_BASE);

    if opts.restart {
        store.reset_crawl_state(&key)?;
    }
    let start_offset = store.crawl_state(&key)?.map_or(0, |s| s.max_offset);
    let mut report = CrawlReport {
        resource_id: opts.resource_id.clone(),
        start_offset,
        next_offset: start_offset,
        ..CrawlReport::default()
    };
    report.events.emit(
        JobStage::Prepare,
        "crawl_started",
        fields([
            ("resource", key.clone()),
            ("offset", start_offset.to_string()),
            ("restart", opts.restart.to_string()),
        ]),
    );
    info!(resource = %key, offset = start_offset, limit, "crawl started");

    let mut offset = start_offset;
    loop {
        if opts.max_pages.is_some_and(|max| report.pages >= max) {
            break;
        }
        if report.pages > 0 {
            sleeper.sleep(opts.sleep);
        }
        let mut query = DatastoreQuery::page(&opts.resource_id, limit, offset);
        query.q = opts.q.clone();
        let page = match fetch_with_retry(api, sleeper, &backoff, opts.max_retries, &query, &mut report) {
            Ok(page) => page,
            Err(e) => {
                warn!(resource = %key, offset, error = %e, "crawl aborted");
                report.events.emit(
                    JobStage::Fetch,
                    "crawl_aborted",
                    fields([("offset", offset.to_string()), ("error", e.to_string())]),
                );
                report.aborted = Some(e.to_string());
                break;
            }
        };
        if page.total.is_some() {
            report.upstream_total = page.total;
        }
        let count = page.records.len() as u64;
        report.pages += 1;
        report.records_seen += count;
        handle(store, offset, page.records, &mut report)?;

        if count < limit {
            // the final page's offset is kept so later runs pick up appended rows
            store.save_crawl_state(&key, offset, true)?;
            report.completed = true;
            report.next_offset = offset;
            debug!(resource = %key, offset, count, "short page, crawl complete");
            break;
        }
        offset += limit;
        store.save_crawl_state(&key, offset, false)?;
        report.next_offset = offset;
        debug!(resource = %key, offset, "page persisted");
    }

    if report.duplicates > 0 {
        info!(resource = %key, duplicates = report.duplicates, "duplicate upstream records skipped");
    }
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report.events.emit(
        JobStage::Finalize,
        "crawl_finished",
        fields([
            ("pages", report.pages.to_string()),
            ("records", report.records_seen.to_string()),
            ("duplicates", report.duplicates.to_string()),
            ("malformed", report.malformed.to_string()),
            ("next_offset", report.next_offset.to_string()),
            ("completed", report.completed.to_string()),
        ]),
    );
    info!(
        resource = %key,
        pages = report.pages,
        records = report.records_seen,
        created = report.created,
        updated = report.updated,
        duplicates = report.duplicates,
        malformed = report.malformed,
        completed = report.completed,
        "crawl finished"
    );
    Ok(report)
}

fn fetch_with_retry(
    api: &dyn UpstreamApi,
    sleeper: &dyn Sleeper,
    backoff: &Backoff,
    max_retries: u32,
    query: &DatastoreQuery,
    report: &mut CrawlReport,
) -> Result<DatastorePage, IngestError> {
    let mut attempt = 0_u32;
    loop {
        match api.datastore_search(query) {
            Ok(page) => return Ok(page),
            Err(e) if e.code.is_transient() && attempt < max_retries => {
                let delay = backoff.delay(attempt);
                warn!(offset = query.offset, attempt, delay_ms = delay.as_millis() as u64, error = %e, "upstream request failed, backing off");
                report.events.emit(
                    JobStage::Fetch,
                    "retry",
                    fields([
                        ("offset", query.offset.to_string()),
                        ("attempt", attempt.to_string()),
                        ("delay_ms", delay.as_millis().to_string()),
                    ]),
                );
                report.retries += 1;
                sleeper.sleep(delay);
                attempt += 1;
            }
            Err(e) if e.code.is_transient() => {
                return Err(IngestError::new(
                    IngestErrorCode::Network,
                    format!("gave up after {} retries: {}", max_retries, e.message),
                ))
            }
            Err(e) => return Err(e),
        }
    }
}
