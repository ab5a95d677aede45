// SPDX-License-Identifier: Apache-2.0

use cmr_core::env::{env_string, env_usize};
use cmr_core::{validate_config, ConfigError, CoreConfig};
use std::path::PathBuf;

use crate::monitor::DEFAULT_WINDOW;

pub const ENV_BIND: &str = "CMR_BIND";
pub const ENV_DB_PATH: &str = "CMR_DB_PATH";
pub const ENV_REDIS_URL: &str = "CMR_REDIS_URL";
pub const ENV_REDIS_PREFIX: &str = "CMR_REDIS_PREFIX";
pub const ENV_STATIC_CACHE_DIR: &str = "CMR_STATIC_CACHE_DIR";
pub const ENV_COMPRESSION_MIN_BYTES: &str = "CMR_COMPRESSION_MIN_BYTES";
pub const ENV_MONITOR_WINDOW: &str = "CMR_MONITOR_WINDOW";
pub const ENV_MAP_FEATURE_LIMIT: &str = "CMR_MAP_FEATURE_LIMIT";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub db_path: PathBuf,
    /// In-process cache when unset.
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub static_cache_dir: Option<PathBuf>,
    pub compression_min_bytes: usize,
    pub monitor_window: usize,
    pub map_feature_limit: usize,
    pub core: CoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            db_path: PathBuf::from("data/cmr.sqlite"),
            redis_url: None,
            redis_prefix: "cmr".to_string(),
            static_cache_dir: None,
            compression_min_bytes: 1024,
            monitor_window: DEFAULT_WINDOW,
            map_feature_limit: cmr_query::MAX_MAP_FEATURES,
            core: CoreConfig::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: env_string(ENV_BIND).unwrap_or(defaults.bind),
            db_path: env_string(ENV_DB_PATH).map_or(defaults.db_path, PathBuf::from),
            redis_url: env_string(ENV_REDIS_URL),
            redis_prefix: env_string(ENV_REDIS_PREFIX).unwrap_or(defaults.redis_prefix),
            static_cache_dir: env_string(ENV_STATIC_CACHE_DIR).map(PathBuf::from),
            compression_min_bytes: env_usize(ENV_COMPRESSION_MIN_BYTES, defaults.compression_min_bytes),
            monitor_window: env_usize(ENV_MONITOR_WINDOW, defaults.monitor_window),
            map_feature_limit: env_usize(ENV_MAP_FEATURE_LIMIT, defaults.map_feature_limit),
            core: CoreConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(&self.core)?;
        if self.monitor_window == 0 {
            return Err(ConfigError("monitor window must be > 0".to_string()));
        }
        if self.map_feature_limit == 0 {
            return Err(ConfigError("map feature limit must be > 0".to_string()));
        }
        if self.redis_prefix.trim().is_empty() {
            return Err(ConfigError("redis prefix must not be empty".to_string()));
        }
        Ok(())
    }
}
