// SPDX-License-Identifier: Apache-2.0

use cmr_core::{fields, JobLog, JobStage};
use cmr_model::{primary_company, primary_technology, ActiveYearTokens, LocationGroup};
use cmr_store::{
    delete_all_location_groups, upsert_location_group, ComponentStore, LocationFilter,
};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::fast::aggregate_location_sql;
use crate::gate::{gate_report, GateReport};
use crate::group::{build_location_group, unrecognized_auction_labels};
use crate::{AggregateError, AggregateErrorCode};

pub const DEFAULT_BATCH_SIZE: usize = 100;
const MAX_REPORTED_LABELS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Hydrate components and aggregate in process.
    Standard,
    /// One aggregate query per location.
    Fast,
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub mode: BuildMode,
    pub batch_size: usize,
    /// Truncate the group table before refilling it.
    pub full_rebuild: bool,
    /// Resume after this location (exclusive).
    pub resume_after: Option<String>,
    pub max_locations: Option<usize>,
    pub activation_threshold: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            mode: BuildMode::Standard,
            batch_size: DEFAULT_BATCH_SIZE,
            full_rebuild: false,
            resume_after: None,
            max_locations: None,
            activation_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub index: u64,
    pub first: Option<String>,
    pub last: Option<String>,
    pub message: String,
}

impl FailedBatch {
    #[must_use]
    pub fn new(index: u64, first: Option<&str>, last: Option<&str>, message: String) -> Self {
        Self {
            index,
            first: first.map(str::to_string),
            last: last.map(str::to_string),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub mode: BuildMode,
    pub full_rebuild: bool,
    pub locations_seen: u64,
    pub groups_created: u64,
    pub groups_updated: u64,
    pub batches: u64,
    pub failed_batches: Vec<FailedBatch>,
    pub unrecognized_auction_labels: Vec<String>,
    /// Last location attempted; pass as `resume_after` to continue.
    pub last_location: Option<String>,
    pub gate: GateReport,
    pub elapsed_ms: u64,
    pub events: JobLog,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    created: u64,
    updated: u64,
    labels: Vec<String>,
}

/// Build or refresh location groups in location order, one transaction per
/// batch. A failing batch is reported and skipped; the run carries on.
pub fn build_aggregates(
    store: &mut ComponentStore,
    tokens: &ActiveYearTokens,
    opts: &AggregateOptions,
) -> Result<AggregateReport, AggregateError> {
    let started = Instant::now();
    let batch_size = opts.batch_size.max(1);
    let mut events = JobLog::default();
    let mut report = AggregateReport {
        mode: opts.mode,
        full_rebuild: opts.full_rebuild,
        locations_seen: 0,
        groups_created: 0,
        groups_updated: 0,
        batches: 0,
        failed_batches: Vec::new(),
        unrecognized_auction_labels: Vec::new(),
        last_location: None,
        gate: gate_report(store.connection(), opts.activation_threshold)?,
        elapsed_ms: 0,
        events: JobLog::default(),
    };

    if opts.full_rebuild {
        let removed = delete_all_location_groups(store.connection())?;
        events.emit(
            JobStage::Prepare,
            "groups_truncated",
            fields([("removed", removed.to_string())]),
        );
        info!(removed, "location groups truncated for full rebuild");
    }

    let mut after = opts.resume_after.clone();
    loop {
        let remaining = opts
            .max_locations
            .map(|max| max.saturating_sub(report.locations_seen as usize));
        if remaining == Some(0) {
            break;
        }
        let limit = remaining.map_or(batch_size, |r| r.min(batch_size));
        let batch = store.distinct_locations(&LocationFilter {
            exclude_placeholders: true,
            after: after.clone(),
            limit: Some(limit),
            ..LocationFilter::default()
        })?;
        if batch.is_empty() {
            break;
        }
        let index = report.batches;
        report.batches += 1;
        report.locations_seen += batch.len() as u64;
        after = batch.last().cloned();
        report.last_location = after.clone();

        match write_batch(store, &batch, tokens, opts.mode) {
            Ok(outcome) => {
                report.groups_created += outcome.created;
                report.groups_updated += outcome.updated;
                for label in outcome.labels {
                    if report.unrecognized_auction_labels.len() < MAX_REPORTED_LABELS
                        && !report.unrecognized_auction_labels.contains(&label)
                    {
                        report.unrecognized_auction_labels.push(label);
                    }
                }
                debug!(batch = index, size = batch.len(), "aggregate batch committed");
            }
            Err(e) => {
                warn!(
                    batch = index,
                    first = batch.first().map(String::as_str).unwrap_or_default(),
                    error = %e,
                    "aggregate batch failed"
                );
                events.emit(
                    JobStage::Persist,
                    "batch_failed",
                    fields([("batch", index.to_string()), ("error", e.to_string())]),
                );
                report.failed_batches.push(FailedBatch::new(
                    index,
                    batch.first().map(String::as_str),
                    batch.last().map(String::as_str),
                    e.to_string(),
                ));
            }
        }
    }

    for label in &report.unrecognized_auction_labels {
        warn!(label = %label, "auction label has no year token; ordering may not be chronological");
    }
    report.gate = gate_report(store.connection(), opts.activation_threshold)?;
    events.emit(
        JobStage::Finalize,
        "aggregates_finished",
        fields([
            ("locations", report.locations_seen.to_string()),
            ("created", report.groups_created.to_string()),
            ("updated", report.groups_updated.to_string()),
            ("failed_batches", report.failed_batches.len().to_string()),
            ("coverage", format!("{:.4}", report.gate.coverage)),
        ]),
    );
    report.events = events;
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        mode = ?opts.mode,
        locations = report.locations_seen,
        created = report.groups_created,
        updated = report.groups_updated,
        failed_batches = report.failed_batches.len(),
        coverage = report.gate.coverage,
        authoritative = report.gate.is_authoritative,
        "aggregate build finished"
    );
    Ok(report)
}

fn compute_group(
    store: &ComponentStore,
    location: &str,
    tokens: &ActiveYearTokens,
    mode: BuildMode,
) -> Result<Option<LocationGroup>, AggregateError> {
    match mode {
        BuildMode::Standard => {
            let components = store.bulk_by_location(location)?;
            Ok(build_location_group(location, &components, tokens))
        }
        BuildMode::Fast => Ok(aggregate_location_sql(store.connection(), location, tokens)?),
    }
}

fn write_batch(
    store: &mut ComponentStore,
    locations: &[String],
    tokens: &ActiveYearTokens,
    mode: BuildMode,
) -> Result<BatchOutcome, AggregateError> {
    let mut groups = Vec::with_capacity(locations.len());
    for location in locations {
        if let Some(group) = compute_group(store, location, tokens, mode)? {
            group.check_invariants(tokens).map_err(|message| {
                AggregateError::new(AggregateErrorCode::Invariant, message)
            })?;
            groups.push(group);
        }
    }

    let mut outcome = BatchOutcome::default();
    let tx = store.connection_mut().transaction()?;
    for group in &groups {
        let existed = tx
            .query_row(
                "SELECT 1 FROM location_groups WHERE location = ?1",
                params![group.location],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        upsert_location_group(
            &tx,
            group,
            primary_technology(&group.technologies),
            primary_company(&group.companies),
        )?;
        if existed {
            outcome.updated += 1;
        } else {
            outcome.created += 1;
        }
        outcome
            .labels
            .extend(unrecognized_auction_labels(group).into_iter().map(str::to_string));
    }
    tx.commit()?;
    Ok(outcome)
}
