// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod commands;
mod jobs;

use clap::{error::ErrorKind, Parser};
use cmr_aggregate::AggregateError;
use cmr_core::{ConfigError, ExitCode, MachineError};
use cmr_freshness::{FreshnessError, FreshnessErrorCode};
use cmr_ingest::IngestError;
use cmr_postcode::{PostcodeError, PostcodeErrorCode};
use cmr_server::{ServerError, ServerErrorCode};
use cmr_store::{StoreError, StoreErrorCode};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::Commands;

pub const CRATE_NAME: &str = "cmr-cli";
pub const DEFAULT_DB_PATH: &str = "data/cmr.sqlite";

#[derive(Parser)]
#[command(name = "cmr")]
#[command(about = "Capacity market register jobs")]
struct Cli {
    /// Machine-readable output and JSON logs.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    /// SQLite database; defaults to CMR_DB_PATH, else `data/cmr.sqlite`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy)]
pub(crate) struct OutputMode {
    pub json: bool,
}

#[derive(Debug)]
pub(crate) struct CliError {
    exit_code: ExitCode,
    machine: MachineError,
}

impl CliError {
    pub(crate) fn new(exit_code: ExitCode, code: &str, message: &str) -> Self {
        Self {
            exit_code,
            machine: MachineError::new(code, message),
        }
    }

    pub(crate) fn internal(message: &str) -> Self {
        Self::new(ExitCode::Internal, "internal_error", message)
    }

    pub(crate) fn dependency(code: &str, message: &str) -> Self {
        Self::new(ExitCode::DependencyFailure, code, message)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(ExitCode::Validation, "config_invalid", &e.0)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        let exit = if matches!(e.code, StoreErrorCode::Locked) {
            ExitCode::DependencyFailure
        } else {
            ExitCode::Internal
        };
        Self::new(exit, e.code.as_str(), &e.message)
    }
}

impl From<AggregateError> for CliError {
    fn from(e: AggregateError) -> Self {
        Self::new(ExitCode::Internal, e.code.as_str(), &e.message)
    }
}

impl From<IngestError> for CliError {
    fn from(e: IngestError) -> Self {
        Self::dependency(e.code.as_str(), &e.message)
    }
}

impl From<FreshnessError> for CliError {
    fn from(e: FreshnessError) -> Self {
        let exit = if matches!(e.code, FreshnessErrorCode::Upstream | FreshnessErrorCode::Alert) {
            ExitCode::DependencyFailure
        } else {
            ExitCode::Internal
        };
        Self::new(exit, e.code.as_str(), &e.message)
    }
}

impl From<PostcodeError> for CliError {
    fn from(e: PostcodeError) -> Self {
        let exit = if matches!(e.code, PostcodeErrorCode::Network) {
            ExitCode::DependencyFailure
        } else {
            ExitCode::Internal
        };
        Self::new(exit, e.code.as_str(), &e.message)
    }
}

impl From<ServerError> for CliError {
    fn from(e: ServerError) -> Self {
        let exit = match e.code {
            ServerErrorCode::Config => ExitCode::Validation,
            ServerErrorCode::Cache => ExitCode::DependencyFailure,
            _ => ExitCode::Internal,
        };
        Self::new(exit, e.code.as_str(), &e.message)
    }
}

pub fn main_entry() -> ProcessExitCode {
    let wants_json = std::env::args().any(|arg| arg == "--json");
    match run() {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(err) => {
            emit_error(&err, wants_json);
            ProcessExitCode::from(err.exit_code as u8)
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{err}");
                return Ok(());
            }
            _ => {
                return Err(CliError {
                    exit_code: ExitCode::Usage,
                    machine: MachineError::new("usage_error", "invalid command line arguments")
                        .with_detail("error", &err.to_string()),
                });
            }
        },
    };
    let output = OutputMode { json: cli.json };
    let command = cli.command.ok_or_else(|| {
        CliError::new(ExitCode::Usage, "usage_error", "missing command; see --help")
    })?;
    init_tracing(output.json);

    let db = cli
        .db
        .or_else(|| cmr_core::env::env_string(cmr_server::config::ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    let core = cmr_core::CoreConfig::from_env();
    cmr_core::validate_config(&core)?;
    let ctx = jobs::JobContext { db, core, output };

    match command {
        Commands::BuildAggregates(args) => jobs::build_aggregates(&ctx, &args, false),
        Commands::BuildAggregatesFast(args) => jobs::build_aggregates(&ctx, &args, true),
        Commands::BuildCompanyLinks { full_rebuild } => jobs::build_company_links(&ctx, full_rebuild),
        Commands::Crawl(args) => jobs::crawl(&ctx, &args),
        Commands::CheckFreshness(args) => jobs::check_freshness(&ctx, &args),
        Commands::WarmCache => jobs::warm_cache(&ctx),
        Commands::RepairCmuIds { dry_run } => jobs::repair_cmu_ids(&ctx, dry_run),
        Commands::NormalizeLocations { dry_run } => jobs::normalize_locations(&ctx, dry_run),
        Commands::GenerateStaticCaches { out_dir } => jobs::generate_static_caches(&ctx, out_dir),
        Commands::BuildPostcodeMapping(args) => jobs::build_postcode_mapping(&ctx, &args),
    }
}

/// Logs go to stderr so stdout carries only the run summary.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = json || cmr_core::env::env_bool("CMR_LOG_JSON", false);
    let _ = if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}

pub(crate) fn emit_ok<T: Serialize>(output: OutputMode, payload: &T) -> Result<(), CliError> {
    let text = if output.json {
        serde_json::to_string(payload)
    } else {
        serde_json::to_string_pretty(payload)
    }
    .map_err(|e| CliError::internal(&e.to_string()))?;
    println!("{text}");
    Ok(())
}

fn emit_error(error: &CliError, machine_json: bool) {
    if machine_json {
        match serde_json::to_string(&error.machine) {
            Ok(payload) => eprintln!("{payload}"),
            Err(_) => eprintln!(
                "{{\"code\":\"internal_error\",\"message\":\"failed to encode structured error\",\"details\":{{}}}}"
            ),
        }
    } else {
        eprintln!("{}: {}", error.machine.code, error.machine.message);
    }
}
