// SPDX-License-Identifier: Apache-2.0

use cmr_core::CacheTtlConfig;
use redis::AsyncCommands;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{ServerError, ServerErrorCode};

const REDIS_TIMEOUT: Duration = Duration::from_millis(250);

/// Route-scoped TTL classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Short,
    Medium,
    Long,
}

impl CacheTier {
    #[must_use]
    pub fn ttl(self, cfg: &CacheTtlConfig) -> Duration {
        match self {
            Self::Short => cfg.short,
            Self::Medium => cfg.medium,
            Self::Long => cfg.long,
        }
    }
}

/// Explicit key: route plus a digest of the normalized request.
#[must_use]
pub fn cache_key(route: &str, fingerprint: &str) -> String {
    let digest = cmr_core::sha256_hex(fingerprint.as_bytes());
    format!("{route}:{}", &digest[..32])
}

/// `used_memory` from the `INFO memory` section.
#[must_use]
pub fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.trim().strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
}

struct MemoryEntry {
    body: Vec<u8>,
    expires_at: Instant,
}

/// Process-local fallback used when no Redis URL is configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.get(key).map(|e| e.body.clone())
    }

    fn set(&self, key: &str, body: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                body,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn used_bytes(&self) -> u64 {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(k, e)| (k.len() + e.body.len()) as u64)
            .sum()
    }

    fn flush(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

pub struct RedisCache {
    client: redis::Client,
    prefix: String,
}

impl RedisCache {
    pub fn new(url: &str, prefix: &str) -> Result<Self, ServerError> {
        let client = redis::Client::open(url)
            .map_err(|e| ServerError::new(ServerErrorCode::Cache, e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, String> {
        match timeout(REDIS_TIMEOUT, self.client.get_multiplexed_async_connection()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("redis connect timeout".to_string()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let mut conn = self.connection().await?;
        let full = format!("{}:{key}", self.prefix);
        match timeout(REDIS_TIMEOUT, conn.get::<_, Option<Vec<u8>>>(full)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("redis read timeout".to_string()),
        }
    }

    async fn set(&self, key: &str, body: &[u8], ttl: Duration) -> Result<(), String> {
        let mut conn = self.connection().await?;
        let full = format!("{}:{key}", self.prefix);
        let secs = ttl.as_secs().max(1);
        match timeout(REDIS_TIMEOUT, conn.set_ex::<_, _, ()>(full, body.to_vec(), secs)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("redis write timeout".to_string()),
        }
    }

    async fn used_memory(&self) -> Result<u64, String> {
        let mut conn = self.connection().await?;
        let info: String = match timeout(
            REDIS_TIMEOUT,
            redis::cmd("INFO").arg("memory").query_async(&mut conn),
        )
        .await
        {
            Ok(result) => result.map_err(|e| e.to_string())?,
            Err(_) => return Err("redis info timeout".to_string()),
        };
        parse_used_memory(&info).ok_or_else(|| "INFO reply lacks used_memory".to_string())
    }

    async fn flush(&self) -> Result<(), String> {
        let mut conn = self.connection().await?;
        match timeout(
            REDIS_TIMEOUT,
            redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn),
        )
        .await
        {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("redis flush timeout".to_string()),
        }
    }
}

enum Backend {
    Memory(MemoryCache),
    Redis(RedisCache),
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    flushes: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub flushes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryCheck {
    pub used_bytes: u64,
    pub cap_bytes: u64,
    pub fraction: f64,
    pub threshold: f64,
    pub flushed: bool,
}

/// Response cache with TTL tiers and a memory watchdog: before every write
/// the backend's memory use is compared with `threshold * cap` and the whole
/// cache is flushed when it is over. Backend failures degrade to a miss.
pub struct SmartCache {
    backend: Backend,
    ttl: CacheTtlConfig,
    threshold: f64,
    cap_bytes: u64,
    counters: CacheCounters,
}

impl SmartCache {
    #[must_use]
    pub fn in_memory(ttl: CacheTtlConfig, threshold: f64, cap_bytes: u64) -> Self {
        Self::with_backend(Backend::Memory(MemoryCache::default()), ttl, threshold, cap_bytes)
    }

    pub fn redis(
        url: &str,
        prefix: &str,
        ttl: CacheTtlConfig,
        threshold: f64,
        cap_bytes: u64,
    ) -> Result<Self, ServerError> {
        Ok(Self::with_backend(
            Backend::Redis(RedisCache::new(url, prefix)?),
            ttl,
            threshold,
            cap_bytes,
        ))
    }

    fn with_backend(backend: Backend, ttl: CacheTtlConfig, threshold: f64, cap_bytes: u64) -> Self {
        Self {
            backend,
            ttl,
            threshold,
            cap_bytes,
            counters: CacheCounters::default(),
        }
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = match &self.backend {
            Backend::Memory(m) => Ok(m.get(key)),
            Backend::Redis(r) => r.get(key).await,
        };
        match result {
            Ok(Some(body)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(body)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Store `body` under `key`; false when the write was skipped or failed.
    pub async fn set(&self, key: &str, tier: CacheTier, body: &[u8]) -> bool {
        self.check_memory().await;
        let ttl = tier.ttl(&self.ttl);
        let result = match &self.backend {
            Backend::Memory(m) => {
                m.set(key, body.to_vec(), ttl);
                Ok(())
            }
            Backend::Redis(r) => r.set(key, body, ttl).await,
        };
        match result {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Read backend memory use and flush everything when over threshold.
    pub async fn check_memory(&self) -> Option<MemoryCheck> {
        let used = match &self.backend {
            Backend::Memory(m) => Ok(m.used_bytes()),
            Backend::Redis(r) => r.used_memory().await,
        };
        let used_bytes = match used {
            Ok(v) => v,
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "cache memory probe failed");
                return None;
            }
        };
        let fraction = if self.cap_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / self.cap_bytes as f64
        };
        let mut check = MemoryCheck {
            used_bytes,
            cap_bytes: self.cap_bytes,
            fraction,
            threshold: self.threshold,
            flushed: false,
        };
        if fraction >= self.threshold {
            let flushed = match &self.backend {
                Backend::Memory(m) => {
                    m.flush();
                    Ok(())
                }
                Backend::Redis(r) => r.flush().await,
            };
            match flushed {
                Ok(()) => {
                    self.counters.flushes.fetch_add(1, Ordering::Relaxed);
                    check.flushed = true;
                    info!(used_bytes, cap_bytes = self.cap_bytes, fraction, "cache over memory threshold; flushed");
                }
                Err(e) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "cache flush failed");
                }
            }
        }
        Some(check)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            backend: self.backend_name(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> CacheTtlConfig {
        CacheTtlConfig::default()
    }

    #[tokio::test]
    async fn hit_after_set_and_flush_over_threshold() {
        let cache = SmartCache::in_memory(ttl(), 0.7, 1000);
        assert!(cache.get("search:a").await.is_none());
        assert!(cache.set("search:a", CacheTier::Medium, &[b'x'; 700]).await);
        assert_eq!(cache.get("search:a").await.map(|b| b.len()), Some(700));

        // 708 bytes held against a 700-byte threshold: the next write flushes first
        assert!(cache.set("search:b", CacheTier::Short, b"{}").await);
        assert!(cache.get("search:a").await.is_none());
        assert!(cache.get("search:b").await.is_some());
        let stats = cache.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.backend, "memory");
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let zero = CacheTtlConfig {
            short: Duration::ZERO,
            ..ttl()
        };
        let cache = SmartCache::in_memory(zero, 0.7, 1 << 20);
        cache.set("suggest:x", CacheTier::Short, b"[]").await;
        assert!(cache.get("suggest:x").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_redis_degrades_to_miss() {
        let cache = SmartCache::redis("redis://127.0.0.1:1", "cmr", ttl(), 0.7, 1 << 20).expect("client");
        assert!(cache.get("search:a").await.is_none());
        assert!(!cache.set("search:a", CacheTier::Long, b"{}").await);
        assert!(cache.stats().failures >= 2);
    }

    #[test]
    fn keys_and_info_parsing() {
        let a = cache_key("search", "q=tesco|status=all");
        assert!(a.starts_with("search:"));
        assert_eq!(a.len(), "search:".len() + 32);
        assert_ne!(a, cache_key("map", "q=tesco|status=all"));
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        assert_eq!(parse_used_memory(info), Some(1_048_576));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }
}
