// SPDX-License-Identifier: Apache-2.0

use cmr_aggregate::{
    build_aggregates as run_aggregates, build_company_links as run_company_links,
    generate_static_artifacts, AggregateOptions, BuildMode, DEFAULT_BATCH_SIZE,
};
use cmr_core::{CoreConfig, ExitCode};
use cmr_freshness::{
    check_freshness as run_freshness, AlertSink, FreshnessOptions, LogSink, MailgunSink, StateFiles,
    DEFAULT_LARGE_DELTA, ENV_LARGE_DELTA,
};
use cmr_ingest::{crawl_cmu_registry, crawl_components, CrawlOptions, HttpUpstream, Resource, ThreadSleeper};
use cmr_model::ActiveYearTokens;
use cmr_postcode::{enrich_locations, CancelFlag, EnrichOptions, PostcodeMapping, PostcodeResolver, POSTCODE_MAPPING_FILE};
use cmr_server::{warm_cache as run_warm, AppState, ServerConfig, SmartCache, WARM_TERMS};
use cmr_store::{ComponentStore, RunLock};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::commands::{AggregateArgs, CrawlArgs, FreshnessArgs, PostcodeArgs, ResourceCli};
use crate::{emit_ok, CliError, OutputMode};

const DEFAULT_STATIC_DIR: &str = "static/cache";

pub(crate) struct JobContext {
    pub db: PathBuf,
    pub core: CoreConfig,
    pub output: OutputMode,
}

impl JobContext {
    /// Writers hold `<db>.lock` for the whole run.
    fn lock(&self, job: &str) -> Result<RunLock, CliError> {
        if let Some(parent) = self.db.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CliError::internal(&e.to_string()))?;
        }
        Ok(RunLock::acquire(&self.db, job)?)
    }

    fn open_store(&self) -> Result<ComponentStore, CliError> {
        Ok(ComponentStore::open(&self.db)?)
    }

    /// Readers never create the database.
    fn read_store(&self) -> Result<ComponentStore, CliError> {
        if !self.db.is_file() {
            return Err(CliError::new(
                ExitCode::Validation,
                "store_missing",
                &format!("no database at {}", self.db.display()),
            ));
        }
        Ok(ComponentStore::open_read_only(&self.db)?)
    }

    fn tokens(&self) -> ActiveYearTokens {
        ActiveYearTokens::new(self.core.active_year_tokens.clone())
    }
}

pub(crate) fn build_aggregates(ctx: &JobContext, args: &AggregateArgs, fast: bool) -> Result<(), CliError> {
    let job = if fast { "build-aggregates-fast" } else { "build-aggregates" };
    let _lock = ctx.lock(job)?;
    let mut store = ctx.open_store()?;
    let opts = AggregateOptions {
        mode: if fast { BuildMode::Fast } else { BuildMode::Standard },
        batch_size: args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        full_rebuild: args.full_rebuild,
        resume_after: args.resume_after.clone(),
        max_locations: args.max_locations,
        activation_threshold: ctx.core.activation_threshold,
    };
    let report = run_aggregates(&mut store, &ctx.tokens(), &opts)?;
    if fast && !report.gate.is_authoritative {
        warn!(
            coverage = report.gate.coverage,
            threshold = ctx.core.activation_threshold,
            "groups cover too few components; search stays on the component fallback"
        );
    }
    emit_ok(ctx.output, &report)?;
    if let Some(first) = report.failed_batches.first() {
        return Err(CliError::internal(&format!(
            "{} aggregate batches failed, first at {:?}: {}",
            report.failed_batches.len(),
            first.first,
            first.message
        )));
    }
    Ok(())
}

pub(crate) fn build_company_links(ctx: &JobContext, full_rebuild: bool) -> Result<(), CliError> {
    let _lock = ctx.lock("build-company-links")?;
    let mut store = ctx.open_store()?;
    let report = run_company_links(&mut store, full_rebuild)?;
    emit_ok(ctx.output, &report)
}

pub(crate) fn crawl(ctx: &JobContext, args: &CrawlArgs) -> Result<(), CliError> {
    let resource = match args.resource {
        ResourceCli::Components => Resource::Components,
        ResourceCli::Cmu => Resource::Cmu,
    };
    let _lock = ctx.lock("crawl")?;
    let mut store = ctx.open_store()?;
    let mut opts = CrawlOptions::for_resource(resource);
    opts.limit = ctx.core.crawl_batch_size as u64;
    opts.sleep = ctx.core.crawl_sleep;
    opts.restart = args.restart;
    opts.max_pages = args.max_pages;
    opts.q = args.q.clone();
    if let Some(retries) = args.max_retries {
        opts.max_retries = retries;
    }
    let api = HttpUpstream::new(&args.endpoint)?;
    let report = match resource {
        Resource::Components => crawl_components(&api, &mut store, &ThreadSleeper, &opts)?,
        Resource::Cmu => crawl_cmu_registry(&api, &mut store, &ThreadSleeper, &opts)?,
    };
    emit_ok(ctx.output, &report)?;
    match &report.aborted {
        Some(reason) => Err(CliError::dependency("upstream_unavailable", reason)),
        None => Ok(()),
    }
}

pub(crate) fn check_freshness(ctx: &JobContext, args: &FreshnessArgs) -> Result<(), CliError> {
    let store = ctx.read_store()?;
    let api = HttpUpstream::new(&args.endpoint)?;
    let files = StateFiles::new(args.state_dir.clone());
    let sink: Box<dyn AlertSink> = match (args.no_email, args.dry_run) {
        (false, false) => match MailgunSink::from_env()? {
            Some(mail) => Box::new(mail),
            None => {
                info!("mail not configured; alerts go to the log");
                Box::new(LogSink)
            }
        },
        _ => Box::new(LogSink),
    };
    let mut opts = FreshnessOptions {
        deep: args.deep,
        focus_years: args.focus_years.clone(),
        update_baseline: args.update_baseline,
        force_summary: args.force_summary,
        large_delta_threshold: args
            .large_delta
            .unwrap_or_else(|| cmr_core::env::env_u64(ENV_LARGE_DELTA, DEFAULT_LARGE_DELTA)),
        dry_run: args.dry_run,
        ..FreshnessOptions::default()
    };
    if let Some(n) = args.sample_size {
        opts.sample_size = n;
    }
    let report = run_freshness(&store, &api, &files, sink.as_ref(), &opts)?;
    emit_ok(ctx.output, &report)
}

pub(crate) fn warm_cache(ctx: &JobContext) -> Result<(), CliError> {
    let mut config = ServerConfig::from_env();
    config.db_path = ctx.db.clone();
    config.core = ctx.core.clone();
    config.validate()?;
    let core = &config.core;
    let cache = match &config.redis_url {
        Some(url) => SmartCache::redis(
            url,
            &config.redis_prefix,
            core.cache_ttl,
            core.redis_mem_threshold,
            core.redis_mem_cap_bytes,
        )?,
        None => {
            warn!("CMR_REDIS_URL unset; warming a process-local cache that ends with this command");
            SmartCache::in_memory(core.cache_ttl, core.redis_mem_threshold, core.redis_mem_cap_bytes)
        }
    };
    let state = AppState::new(config, cache);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(&e.to_string()))?;
    let report = runtime.block_on(run_warm(&state, &WARM_TERMS));
    emit_ok(ctx.output, &report)?;
    if report.written == 0 && report.failed > 0 {
        return Err(CliError::new(
            ExitCode::DependencyFailure,
            "cache_unavailable",
            "no warm query reached the cache",
        ));
    }
    Ok(())
}

pub(crate) fn repair_cmu_ids(ctx: &JobContext, dry_run: bool) -> Result<(), CliError> {
    let _lock = ctx.lock("repair-cmu-ids")?;
    let mut store = ctx.open_store()?;
    let report = store.repair_cmu_ids(dry_run)?;
    emit_ok(ctx.output, &report)
}

pub(crate) fn normalize_locations(ctx: &JobContext, dry_run: bool) -> Result<(), CliError> {
    let _lock = ctx.lock("normalize-locations")?;
    let mut store = ctx.open_store()?;
    let report = store.normalize_locations(dry_run)?;
    emit_ok(ctx.output, &report)
}

pub(crate) fn generate_static_caches(ctx: &JobContext, out_dir: Option<PathBuf>) -> Result<(), CliError> {
    let dir = out_dir
        .or_else(|| cmr_core::env::env_string(cmr_server::config::ENV_STATIC_CACHE_DIR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));
    let store = ctx.read_store()?;
    let index = generate_static_artifacts(&store, &dir)?;
    emit_ok(ctx.output, &index)
}

fn default_mapping_path(db: &Path) -> PathBuf {
    db.parent()
        .map_or_else(|| PathBuf::from(POSTCODE_MAPPING_FILE), |p| p.join(POSTCODE_MAPPING_FILE))
}

pub(crate) fn build_postcode_mapping(ctx: &JobContext, args: &PostcodeArgs) -> Result<(), CliError> {
    let _lock = ctx.lock("build-postcode-mapping")?;
    let mut store = ctx.open_store()?;
    let path = args.mapping.clone().unwrap_or_else(|| default_mapping_path(&ctx.db));
    let mut mapping = PostcodeMapping::load(&path)?;
    let cancel = CancelFlag::default();
    let mut resolver = PostcodeResolver::http(&args.endpoint, ctx.core.postcode_rate_limit, cancel.clone())?;
    let opts = EnrichOptions {
        only_missing: !args.all,
        save_every_calls: args.save_every,
        mapping_path: Some(path),
    };
    let report = enrich_locations(&mut store, &mut resolver, &mut mapping, &opts, &cancel)?;
    emit_ok(ctx.output, &report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_sits_next_to_the_database() {
        assert_eq!(
            default_mapping_path(Path::new("data/cmr.sqlite")),
            PathBuf::from("data").join(POSTCODE_MAPPING_FILE)
        );
    }
}
