// SPDX-License-Identifier: Apache-2.0

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Materialize location groups from components.
    BuildAggregates(AggregateArgs),
    /// Same as build-aggregates, one aggregate query per location.
    BuildAggregatesFast(AggregateArgs),
    BuildCompanyLinks {
        #[arg(long, default_value_t = false)]
        full_rebuild: bool,
    },
    /// Pull upstream pages into the local store, resuming from the saved offset.
    Crawl(CrawlArgs),
    CheckFreshness(FreshnessArgs),
    /// Prime the response cache with common list queries.
    WarmCache,
    RepairCmuIds {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    NormalizeLocations {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    GenerateStaticCaches {
        /// Defaults to CMR_STATIC_CACHE_DIR, else `static/cache`.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Resolve location postcodes and write outward code and county back.
    BuildPostcodeMapping(PostcodeArgs),
}

#[derive(Args)]
pub(crate) struct AggregateArgs {
    #[arg(long, default_value_t = false)]
    pub full_rebuild: bool,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub resume_after: Option<String>,
    #[arg(long)]
    pub max_locations: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum ResourceCli {
    Components,
    Cmu,
}

#[derive(Args)]
pub(crate) struct CrawlArgs {
    #[arg(long, value_enum, default_value_t = ResourceCli::Components)]
    pub resource: ResourceCli,
    #[arg(long, default_value_t = false)]
    pub restart: bool,
    #[arg(long)]
    pub max_pages: Option<u64>,
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Upstream full-text filter.
    #[arg(long)]
    pub q: Option<String>,
    #[arg(long, default_value = cmr_ingest::DEFAULT_UPSTREAM_API)]
    pub endpoint: String,
}

#[derive(Args)]
pub(crate) struct FreshnessArgs {
    #[arg(long, default_value = "data/freshness")]
    pub state_dir: PathBuf,
    #[arg(long, default_value_t = false)]
    pub deep: bool,
    #[arg(long = "focus-year")]
    pub focus_years: Vec<String>,
    #[arg(long)]
    pub sample_size: Option<u64>,
    #[arg(long, default_value_t = false)]
    pub update_baseline: bool,
    #[arg(long, default_value_t = false)]
    pub force_summary: bool,
    /// Component delta that mails a quiet run at once.
    #[arg(long)]
    pub large_delta: Option<u64>,
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Log alerts instead of mailing them.
    #[arg(long, default_value_t = false)]
    pub no_email: bool,
    #[arg(long, default_value = cmr_ingest::DEFAULT_UPSTREAM_API)]
    pub endpoint: String,
}

#[derive(Args)]
pub(crate) struct PostcodeArgs {
    /// Defaults to `postcode_mapping.json` next to the database.
    #[arg(long)]
    pub mapping: Option<PathBuf>,
    /// Re-resolve locations that already carry an outward code.
    #[arg(long, default_value_t = false)]
    pub all: bool,
    #[arg(long, default_value_t = 100)]
    pub save_every: u64,
    #[arg(long, default_value = cmr_postcode::DEFAULT_POSTCODE_API)]
    pub endpoint: String,
}
