// SPDX-License-Identifier: Apache-2.0

use cmr_core::{fields, JobLog, JobStage};
use cmr_store::{AdminFields, ComponentStore, LocationFilter};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::client::{PostcodeResolver, Resolution};
use crate::extract::{extract, outward_of};
use crate::limiter::CancelFlag;
use crate::mapping::PostcodeMapping;
use crate::PostcodeError;

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Skip locations whose components already carry an outward code.
    pub only_missing: bool,
    /// Persist the mapping after this many API calls.
    pub save_every_calls: u64,
    pub mapping_path: Option<PathBuf>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            only_missing: true,
            save_every_calls: 100,
            mapping_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichReport {
    pub locations_scanned: u64,
    pub locations_enriched: u64,
    pub locations_without_postcode: u64,
    pub locations_unresolved: u64,
    pub components_updated: u64,
    pub lookups_failed: u64,
    pub api_calls: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub events: JobLog,
}

/// Resolve every groupable location's postcode and write the outward code and
/// county back to all components sharing that literal location.
pub fn enrich_locations(
    store: &mut ComponentStore,
    resolver: &mut PostcodeResolver,
    mapping: &mut PostcodeMapping,
    opts: &EnrichOptions,
    cancel: &CancelFlag,
) -> Result<EnrichReport, PostcodeError> {
    let started = Instant::now();
    let mut report = EnrichReport::default();
    let filter = LocationFilter {
        exclude_placeholders: true,
        missing_admin_only: opts.only_missing,
        ..LocationFilter::default()
    };
    let locations = store.distinct_locations(&filter)?;
    report.events.emit(
        JobStage::Prepare,
        "locations_selected",
        fields([("count", locations.len().to_string())]),
    );
    let calls_at_start = resolver.api_calls();
    let mut last_saved_calls = calls_at_start;

    for location in &locations {
        if cancel.is_cancelled() {
            report.cancelled = true;
            warn!(scanned = report.locations_scanned, "postcode enrichment cancelled");
            break;
        }
        report.locations_scanned += 1;
        let matches = extract(location);
        if matches.is_empty() {
            report.locations_without_postcode += 1;
            continue;
        }
        let mut admin = None;
        if let Some(full) = matches.full_postcodes.first() {
            admin = lookup_postcode(resolver, mapping, full, &mut report);
            if admin.is_none() {
                if let Some(outward) = outward_of(full) {
                    admin = lookup_outcode(resolver, mapping, outward, &mut report);
                }
            }
        }
        if admin.is_none() {
            if let Some(outward) = matches.outward_codes.first() {
                admin = lookup_outcode(resolver, mapping, outward, &mut report);
            }
        }
        let Some(admin) = admin else {
            report.locations_unresolved += 1;
            continue;
        };
        let updated = store.set_admin_fields(location, &admin)?;
        report.components_updated += updated as u64;
        report.locations_enriched += 1;

        if resolver.api_calls() - last_saved_calls >= opts.save_every_calls.max(1) {
            save_mapping(mapping, opts, report.locations_scanned, resolver.api_calls() - calls_at_start)?;
            last_saved_calls = resolver.api_calls();
        }
    }

    report.api_calls = resolver.api_calls() - calls_at_start;
    save_mapping(mapping, opts, report.locations_scanned, report.api_calls)?;
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report.events.emit(
        JobStage::Finalize,
        "enrichment_finished",
        fields([
            ("enriched", report.locations_enriched.to_string()),
            ("components_updated", report.components_updated.to_string()),
            ("api_calls", report.api_calls.to_string()),
        ]),
    );
    info!(
        scanned = report.locations_scanned,
        enriched = report.locations_enriched,
        components = report.components_updated,
        api_calls = report.api_calls,
        "postcode enrichment finished"
    );
    Ok(report)
}

fn save_mapping(
    mapping: &mut PostcodeMapping,
    opts: &EnrichOptions,
    scanned: u64,
    api_calls: u64,
) -> Result<(), PostcodeError> {
    mapping.metadata.generated_at = chrono::Utc::now().to_rfc3339();
    mapping.metadata.locations_scanned = scanned;
    mapping.metadata.api_calls = api_calls;
    match &opts.mapping_path {
        Some(path) => mapping.save(path),
        None => Ok(()),
    }
}

fn lookup_postcode(
    resolver: &mut PostcodeResolver,
    mapping: &mut PostcodeMapping,
    postcode: &str,
    report: &mut EnrichReport,
) -> Option<AdminFields> {
    if let Some(info) = mapping.full_postcodes.get(postcode) {
        return Some(AdminFields {
            outward_code: Some(info.outcode.clone()),
            county: info.county.clone(),
            latitude: info.latitude,
            longitude: info.longitude,
        });
    }
    if mapping.is_invalid(postcode) {
        return None;
    }
    match resolver.resolve_postcode(postcode) {
        Resolution::Found(info) => {
            let admin = AdminFields {
                outward_code: Some(info.outcode.clone()),
                county: info.county.clone(),
                latitude: info.latitude,
                longitude: info.longitude,
            };
            mapping.record_postcode(info);
            Some(admin)
        }
        Resolution::NotFound => {
            mapping.mark_invalid(postcode);
            None
        }
        Resolution::Failed(_) => {
            report.lookups_failed += 1;
            None
        }
    }
}

fn lookup_outcode(
    resolver: &mut PostcodeResolver,
    mapping: &mut PostcodeMapping,
    outcode: &str,
    report: &mut EnrichReport,
) -> Option<AdminFields> {
    let admin_of = |info: &crate::client::OutcodeInfo| AdminFields {
        outward_code: Some(info.outcode.clone()),
        county: info.county().map(str::to_string),
        latitude: info.latitude,
        longitude: info.longitude,
    };
    if let Some(info) = mapping.outward_codes.get(outcode) {
        return Some(admin_of(info));
    }
    if mapping.is_invalid(outcode) {
        return None;
    }
    match resolver.resolve_outcode(outcode) {
        Resolution::Found(info) => {
            let admin = admin_of(&info);
            mapping.record_outcode(info);
            Some(admin)
        }
        Resolution::NotFound => {
            mapping.mark_invalid(outcode);
            None
        }
        Resolution::Failed(_) => {
            report.lookups_failed += 1;
            None
        }
    }
}
