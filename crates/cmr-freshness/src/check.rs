// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, NaiveDateTime, Utc};
use cmr_core::{fields, JobLog, JobStage};
use cmr_ingest::{UpstreamApi, COMPONENT_RESOURCE_ID};
use cmr_model::{FreshnessBaseline, FreshnessDecision, HistoryEntry, BASELINE_VERSION};
use cmr_store::ComponentStore;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{info, warn};

use crate::alert::{alert_subject, AlertDeltas, AlertSink, DEFAULT_LARGE_DELTA};
use crate::classify::{classify, Classification, Thresholds};
use crate::deep::{deep_check, DeepCheckReport, DEFAULT_SAMPLE_SIZE};
use crate::files::StateFiles;
use crate::totals::{local_totals, probe_years, upstream_totals, LocalTotals, UpstreamTotals};
use crate::FreshnessError;

pub const STALE_AFTER_DAYS: i64 = 14;
const WEEKLY_CADENCE_DAYS: i64 = 7;
const DEFAULT_PROBE_AHEAD: usize = 3;
const UNKNOWN_AGE: i64 = -1;

#[derive(Debug, Clone)]
pub struct FreshnessOptions {
    pub resource_id: String,
    pub thresholds: Thresholds,
    /// Delivery years past the local maximum to probe upstream.
    pub probe_ahead: usize,
    pub deep: bool,
    /// Years sampled by the deep check; defaults to the probed future years.
    pub focus_years: Vec<String>,
    pub sample_size: u64,
    /// Replace the baseline when the run comes back `current`.
    pub update_baseline: bool,
    pub force_summary: bool,
    /// Component delta that mails a quiet run immediately.
    pub large_delta_threshold: u64,
    /// Classify only: no files written, nothing sent.
    pub dry_run: bool,
    pub now: DateTime<Utc>,
}

impl Default for FreshnessOptions {
    fn default() -> Self {
        Self {
            resource_id: COMPONENT_RESOURCE_ID.to_string(),
            thresholds: Thresholds::default(),
            probe_ahead: DEFAULT_PROBE_AHEAD,
            deep: false,
            focus_years: Vec::new(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            update_baseline: false,
            force_summary: false,
            large_delta_threshold: DEFAULT_LARGE_DELTA,
            dry_run: false,
            now: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FreshnessReport {
    pub checked_at: String,
    pub local: LocalTotals,
    pub upstream: UpstreamTotals,
    pub classification: Classification,
    pub baseline: Option<FreshnessBaseline>,
    /// Local component count minus the baseline's.
    pub baseline_delta: Option<i64>,
    pub deep: Option<DeepCheckReport>,
    pub data_age_days: Option<i64>,
    pub recommendation: String,
    pub alert_subject: Option<String>,
    pub alert_sent: bool,
    pub alert_error: Option<String>,
    pub events: JobLog,
}

impl FreshnessReport {
    #[must_use]
    pub fn decision(&self) -> FreshnessDecision {
        self.classification.decision
    }
}

/// Whole days between the newest local write and `now`.
#[must_use]
pub fn data_age_days(latest_update: Option<&str>, now: DateTime<Utc>) -> Option<i64> {
    let raw = latest_update?;
    let at = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()?;
    Some((now - at).num_days())
}

/// Run one freshness check end to end.
pub fn check_freshness(
    store: &ComponentStore,
    api: &dyn UpstreamApi,
    files: &StateFiles,
    sink: &dyn AlertSink,
    opts: &FreshnessOptions,
) -> Result<FreshnessReport, FreshnessError> {
    let mut events = JobLog::default();
    let local = local_totals(store)?;
    let years = probe_years(&local, opts.probe_ahead);
    events.emit(
        JobStage::Prepare,
        "local_totals",
        fields([
            ("components", local.components.to_string()),
            ("cmus", local.cmus.to_string()),
            ("years", local.year_counts.len().to_string()),
        ]),
    );

    let upstream = upstream_totals(api, &opts.resource_id, &years)?;
    events.emit(
        JobStage::Fetch,
        "upstream_totals",
        fields([
            ("components", upstream.components.to_string()),
            ("per_year", upstream.year_counts.is_some().to_string()),
        ]),
    );

    let mut classification = classify(&local, &upstream, &opts.thresholds);

    let deep = if opts.deep {
        let focus = if opts.focus_years.is_empty() {
            years[local.year_counts.len().min(years.len())..].to_vec()
        } else {
            opts.focus_years.clone()
        };
        let report = deep_check(api, store, &opts.resource_id, &focus, opts.sample_size)?;
        if report.found_changes() && classification.decision == FreshnessDecision::DuplicateArtifact {
            classification.decision = FreshnessDecision::Update;
            classification.reason = format!(
                "{}; sample crawl found {} new and {} changed rows",
                classification.reason, report.total_new, report.total_updated
            );
        }
        events.emit(
            JobStage::Transform,
            "deep_check",
            fields([
                ("years", focus.len().to_string()),
                ("new", report.total_new.to_string()),
                ("updated", report.total_updated.to_string()),
            ]),
        );
        Some(report)
    } else {
        None
    };

    let data_age = data_age_days(local.latest_update.as_deref(), opts.now);
    let recommendation = recommendation(&classification, data_age);

    let mut baseline = files.load_baseline()?;
    let baseline_delta = baseline
        .as_ref()
        .map(|b| local.components as i64 - b.components_count as i64);
    let refresh_baseline = baseline.is_none()
        || (opts.update_baseline && classification.decision == FreshnessDecision::Current);
    if refresh_baseline {
        let fresh = FreshnessBaseline {
            created_date: opts.now.to_rfc3339(),
            components_count: local.components,
            cmu_count: local.cmus,
            year_counts: local.year_counts.clone(),
            auction_counts: local.auction_counts.clone(),
            api_total_at_baseline: Some(upstream.components),
            version: BASELINE_VERSION.to_string(),
        };
        if !opts.dry_run {
            files.save_baseline(&fresh)?;
        }
        baseline = Some(fresh);
    }

    let history = files.load_history()?;
    let weekly_due = opts.force_summary
        || history
            .last()
            .and_then(|h| DateTime::parse_from_rfc3339(&h.date).ok())
            .map_or(true, |last| (opts.now - last.with_timezone(&Utc)).num_days() >= WEEKLY_CADENCE_DAYS);

    let deltas = AlertDeltas {
        upstream: classification.delta,
        baseline: baseline_delta,
        large_threshold: opts.large_delta_threshold,
    };
    let subject = alert_subject(classification.decision, deltas, weekly_due);
    let mut report = FreshnessReport {
        checked_at: opts.now.to_rfc3339(),
        local,
        upstream,
        classification,
        baseline,
        baseline_delta,
        deep,
        data_age_days: data_age,
        recommendation,
        alert_subject: subject,
        alert_sent: false,
        alert_error: None,
        events,
    };

    if !opts.dry_run {
        files.append_history(HistoryEntry {
            date: report.checked_at.clone(),
            components_count: report.local.components,
            cmu_count: report.local.cmus,
            decision: report.classification.decision,
            new_years: report.classification.new_years.clone(),
            data_age_days: report.data_age_days.unwrap_or(UNKNOWN_AGE),
            recommendation: report.recommendation.clone(),
        })?;
        if let Some(subject) = report.alert_subject.clone() {
            match sink.send(&subject, &render_body(&report)) {
                Ok(()) => report.alert_sent = true,
                Err(e) => {
                    warn!(sink = sink.name(), error = %e, "freshness notification failed");
                    report.alert_error = Some(e.to_string());
                }
            }
        }
    }

    report.events.emit(
        JobStage::Finalize,
        "freshness_checked",
        fields([
            ("decision", report.classification.decision.as_str().to_string()),
            ("delta", report.classification.delta.to_string()),
            ("alert_sent", report.alert_sent.to_string()),
        ]),
    );
    info!(
        decision = %report.classification.decision,
        local = report.local.components,
        upstream = report.upstream.components,
        delta = report.classification.delta,
        alert = report.alert_subject.as_deref().unwrap_or("none"),
        "freshness check finished"
    );
    Ok(report)
}

fn recommendation(classification: &Classification, data_age: Option<i64>) -> String {
    let mut text = match classification.decision {
        FreshnessDecision::Current => "no action".to_string(),
        FreshnessDecision::DuplicateArtifact => {
            "no action: upstream count is inflated by duplicate rows in known delivery years".to_string()
        }
        FreshnessDecision::Update => "run an incremental crawl, then rebuild aggregates".to_string(),
        FreshnessDecision::NewAuction => format!(
            "run a full crawl for delivery years {}, then rebuild aggregates",
            classification.new_years.join(", ")
        ),
        FreshnessDecision::Investigate => {
            "investigate: local store holds records the upstream no longer lists".to_string()
        }
    };
    if let Some(age) = data_age.filter(|age| *age > STALE_AFTER_DAYS) {
        let _ = write!(text, "; data is {age} days old, consider a refresh");
    }
    text
}

fn render_body(report: &FreshnessReport) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Capacity market freshness check {}", report.checked_at);
    let _ = writeln!(body);
    let _ = writeln!(body, "Decision: {}", report.classification.decision);
    let _ = writeln!(body, "Reason: {}", report.classification.reason);
    let _ = writeln!(body, "Recommendation: {}", report.recommendation);
    let _ = writeln!(body);
    let _ = writeln!(body, "Local components: {}", report.local.components);
    let _ = writeln!(body, "Local CMUs: {}", report.local.cmus);
    let _ = writeln!(body, "Upstream components: {}", report.upstream.components);
    if let Some(delta) = report.baseline_delta {
        let _ = writeln!(body, "Change since baseline: {delta:+}");
    }
    if let Some(age) = report.data_age_days {
        let _ = writeln!(body, "Data age: {age} days");
    }
    if let Some(per_year) = &report.upstream.year_counts {
        let _ = writeln!(body);
        for (year, upstream) in per_year {
            let local = report.local.year_counts.get(year).copied().unwrap_or(0);
            let _ = writeln!(body, "{year}: {local} local vs {upstream} upstream");
        }
    }
    if let Some(deep) = &report.deep {
        let _ = writeln!(body);
        for year in &deep.years {
            match &year.error {
                Some(e) => {
                    let _ = writeln!(body, "{} sample: error {e}", year.year);
                }
                None => {
                    let _ = writeln!(
                        body,
                        "{} sample: {} checked, {} new, {} changed",
                        year.year, year.attempted, year.found_new, year.found_updated
                    );
                }
            }
        }
    }
    body
}
