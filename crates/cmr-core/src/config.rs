// SPDX-License-Identifier: Apache-2.0

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::env::{env_duration_ms, env_duration_secs, env_f64, env_list, env_u64, env_usize};

pub const ENV_ACTIVE_YEAR_TOKENS: &str = "CMR_ACTIVE_YEAR_TOKENS";
pub const ENV_CACHE_TTL_SHORT: &str = "CMR_CACHE_TTL_SHORT";
pub const ENV_CACHE_TTL_MEDIUM: &str = "CMR_CACHE_TTL_MEDIUM";
pub const ENV_CACHE_TTL_LONG: &str = "CMR_CACHE_TTL_LONG";
pub const ENV_REDIS_MEM_THRESHOLD: &str = "CMR_REDIS_MEM_THRESHOLD";
pub const ENV_REDIS_MEM_CAP_BYTES: &str = "CMR_REDIS_MEM_CAP_BYTES";
pub const ENV_PER_PAGE_CAP: &str = "CMR_PER_PAGE_CAP";
pub const ENV_CRAWL_SLEEP_MS: &str = "CMR_CRAWL_SLEEP_MS";
pub const ENV_CRAWL_BATCH_SIZE: &str = "CMR_CRAWL_BATCH_SIZE";
pub const ENV_POSTCODE_RATE_LIMIT: &str = "CMR_POSTCODE_RATE_LIMIT";
pub const ENV_ACTIVATION_THRESHOLD: &str = "CMR_ACTIVATION_THRESHOLD";

const ACTIVE_YEAR_SPAN: i32 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheTtlConfig {
    #[serde(with = "secs")]
    pub short: Duration,
    #[serde(with = "secs")]
    pub medium: Duration,
    #[serde(with = "secs")]
    pub long: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(120),
            medium: Duration::from_secs(300),
            long: Duration::from_secs(600),
        }
    }
}

/// Options recognised by every job and by the request path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    pub active_year_tokens: Vec<String>,
    pub cache_ttl: CacheTtlConfig,
    pub redis_mem_threshold: f64,
    pub redis_mem_cap_bytes: u64,
    pub per_page_cap: usize,
    #[serde(with = "millis")]
    pub crawl_sleep: Duration,
    pub crawl_batch_size: usize,
    pub postcode_rate_limit: u32,
    pub activation_threshold: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            active_year_tokens: default_active_year_tokens(Utc::now().date_naive()),
            cache_ttl: CacheTtlConfig::default(),
            redis_mem_threshold: 0.7,
            redis_mem_cap_bytes: 30 * 1024 * 1024,
            per_page_cap: 50,
            crawl_sleep: Duration::from_millis(1000),
            crawl_batch_size: 1000,
            postcode_rate_limit: 60,
            activation_threshold: 0.8,
        }
    }
}

impl CoreConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            active_year_tokens: env_list(ENV_ACTIVE_YEAR_TOKENS)
                .unwrap_or(defaults.active_year_tokens),
            cache_ttl: CacheTtlConfig {
                short: env_duration_secs(ENV_CACHE_TTL_SHORT, defaults.cache_ttl.short.as_secs()),
                medium: env_duration_secs(
                    ENV_CACHE_TTL_MEDIUM,
                    defaults.cache_ttl.medium.as_secs(),
                ),
                long: env_duration_secs(ENV_CACHE_TTL_LONG, defaults.cache_ttl.long.as_secs()),
            },
            redis_mem_threshold: env_f64(ENV_REDIS_MEM_THRESHOLD, defaults.redis_mem_threshold),
            redis_mem_cap_bytes: env_u64(ENV_REDIS_MEM_CAP_BYTES, defaults.redis_mem_cap_bytes),
            per_page_cap: env_usize(ENV_PER_PAGE_CAP, defaults.per_page_cap),
            crawl_sleep: env_duration_ms(
                ENV_CRAWL_SLEEP_MS,
                defaults.crawl_sleep.as_millis() as u64,
            ),
            crawl_batch_size: env_usize(ENV_CRAWL_BATCH_SIZE, defaults.crawl_batch_size),
            postcode_rate_limit: env_u64(
                ENV_POSTCODE_RATE_LIMIT,
                u64::from(defaults.postcode_rate_limit),
            ) as u32,
            activation_threshold: env_f64(ENV_ACTIVATION_THRESHOLD, defaults.activation_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

pub fn validate_config(cfg: &CoreConfig) -> Result<(), ConfigError> {
    if cfg.active_year_tokens.is_empty()
        || cfg.active_year_tokens.iter().any(|t| t.trim().is_empty())
    {
        return Err(ConfigError(
            "active year tokens must be a non-empty list of non-blank tokens".to_string(),
        ));
    }
    if cfg.cache_ttl.short.is_zero() || cfg.cache_ttl.medium.is_zero() || cfg.cache_ttl.long.is_zero()
    {
        return Err(ConfigError("cache ttl tiers must be > 0".to_string()));
    }
    if !(cfg.cache_ttl.short <= cfg.cache_ttl.medium && cfg.cache_ttl.medium <= cfg.cache_ttl.long) {
        return Err(ConfigError(
            "cache ttl tiers must satisfy short <= medium <= long".to_string(),
        ));
    }
    if !(cfg.redis_mem_threshold > 0.0 && cfg.redis_mem_threshold <= 1.0) {
        return Err(ConfigError(
            "redis memory threshold must be in (0, 1]".to_string(),
        ));
    }
    if cfg.redis_mem_cap_bytes == 0 {
        return Err(ConfigError("redis memory cap must be > 0".to_string()));
    }
    if !(10..=50).contains(&cfg.per_page_cap) {
        return Err(ConfigError("per page cap must be within 10..=50".to_string()));
    }
    if cfg.crawl_batch_size == 0 {
        return Err(ConfigError("crawl batch size must be > 0".to_string()));
    }
    if cfg.postcode_rate_limit == 0 {
        return Err(ConfigError("postcode rate limit must be > 0".to_string()));
    }
    if !(cfg.activation_threshold > 0.0 && cfg.activation_threshold <= 1.0) {
        return Err(ConfigError(
            "activation threshold must be in (0, 1]".to_string(),
        ));
    }
    Ok(())
}

/// First calendar year of the delivery year containing `today`.
/// Delivery years run from 1 October to 30 September.
#[must_use]
pub fn contract_year_start(today: NaiveDate) -> i32 {
    if today.month() >= 10 {
        today.year()
    } else {
        today.year() - 1
    }
}

/// Tokens for the current delivery year and the next five, e.g. `2024-25`.
#[must_use]
pub fn default_active_year_tokens(today: NaiveDate) -> Vec<String> {
    let start = contract_year_start(today);
    (start..start + ACTIVE_YEAR_SPAN)
        .map(|y| format!("{y}-{:02}", (y + 1).rem_euclid(100)))
        .collect()
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
