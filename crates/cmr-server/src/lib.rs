// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use cmr_model::ActiveYearTokens;
use cmr_query::{QueryError, SearchContext, StaticOutcodeIndex};
use cmr_store::{ComponentStore, StoreError};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{info, warn};

mod cache;
mod compress;
pub mod config;
mod http;
mod middleware;
pub mod monitor;
mod warm;

pub use cache::{
    cache_key, parse_used_memory, CacheStats, CacheTier, MemoryCheck, SmartCache,
};
pub use compress::{accepts_gzip, maybe_gzip};
pub use config::ServerConfig;
pub use http::{search_payload, ROUTE_COMPONENT_RAW, ROUTE_LOCATION, ROUTE_MAP, ROUTE_SEARCH, ROUTE_SUGGEST};
pub use monitor::{EgressMonitor, EndpointRollup, MonitorSnapshot, ResponseRecord};
pub use warm::{warm_cache, WarmReport, WARM_STATUSES, WARM_TERMS};

pub const CRATE_NAME: &str = "cmr-server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServerErrorCode {
    Config,
    Store,
    Query,
    Cache,
    Io,
    Internal,
}

impl ServerErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config_invalid",
            Self::Store => "store_unavailable",
            Self::Query => "query_failed",
            Self::Cache => "cache_unavailable",
            Self::Io => "io_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: ServerErrorCode,
    pub message: String,
}

impl ServerError {
    #[must_use]
    pub fn new(code: ServerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ServerError {}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::new(ServerErrorCode::Store, e.to_string())
    }
}

impl From<QueryError> for ServerError {
    fn from(e: QueryError) -> Self {
        Self::new(ServerErrorCode::Query, e.to_string())
    }
}

/// Read-only inputs every query needs.
pub struct QueryEnv {
    pub tokens: ActiveYearTokens,
    pub activation_threshold: f64,
    pub outcodes: StaticOutcodeIndex,
}

impl QueryEnv {
    #[must_use]
    pub fn search_context(&self) -> SearchContext<'_> {
        SearchContext {
            tokens: &self.tokens,
            activation_threshold: self.activation_threshold,
            outcodes: Some(&self.outcodes),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub cache: Arc<SmartCache>,
    pub monitor: Arc<EgressMonitor>,
    pub env: Arc<QueryEnv>,
}

impl AppState {
    /// A static outward index that fails to load leaves postcode expansion to
    /// the database.
    #[must_use]
    pub fn new(config: ServerConfig, cache: SmartCache) -> Self {
        let outcodes = match &config.static_cache_dir {
            Some(dir) => StaticOutcodeIndex::load(dir).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "static outward index unreadable");
                StaticOutcodeIndex::default()
            }),
            None => StaticOutcodeIndex::default(),
        };
        info!(outward_codes = outcodes.len(), cache = cache.backend_name(), "server state ready");
        let env = QueryEnv {
            tokens: ActiveYearTokens::new(config.core.active_year_tokens.clone()),
            activation_threshold: config.core.activation_threshold,
            outcodes,
        };
        Self {
            monitor: Arc::new(EgressMonitor::new(config.monitor_window)),
            config: Arc::new(config),
            cache: Arc::new(cache),
            env: Arc::new(env),
        }
    }
}

/// Run `f` against a fresh read-only store handle on the blocking pool.
pub(crate) async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&ComponentStore, &QueryEnv) -> Result<T, ServerError> + Send + 'static,
{
    let path = state.config.db_path.clone();
    let env = Arc::clone(&state.env);
    tokio::task::spawn_blocking(move || {
        let store = ComponentStore::open_read_only(&path)?;
        f(&store, &env)
    })
    .await
    .map_err(|e| ServerError::new(ServerErrorCode::Internal, e.to_string()))?
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/search", get(http::handlers::search_handler))
        .route("/api/map", get(http::handlers::map_handler))
        .route("/api/locations/:id", get(http::handlers::location_handler))
        .route("/api/components/:id/raw", get(http::handlers::component_raw_handler))
        .route("/api/companies/suggest", get(http::handlers::suggest_handler))
        .route("/static/cache/:name", get(http::handlers::static_artifact_handler))
        .route_layer(from_fn_with_state(state.clone(), middleware::track_egress));
    Router::new()
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/monitor", get(http::handlers::monitor_handler))
        .merge(api)
        .with_state(state)
}
