// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub const DEFAULT_WINDOW: usize = 1000;
pub const LARGE_RESPONSE_BYTES: u64 = 5 * 1024 * 1024;
pub const MEMORY_ALERT_BYTES: i64 = 50 * 1024 * 1024;
pub const MONTHLY_BUDGET_BYTES: u64 = 5 * 1024 * 1024 * 1024;
const SECONDS_PER_MONTH: f64 = 30.0 * 24.0 * 3600.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub endpoint: String,
    pub method: String,
    pub bytes: u64,
    pub duration_ms: u64,
    pub memory_delta_bytes: i64,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointRollup {
    pub calls: u64,
    pub bytes: u64,
    pub mean_bytes: f64,
    pub max_bytes: u64,
    pub large_responses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryAlert {
    pub endpoint: String,
    pub memory_delta_bytes: i64,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub window_size: usize,
    pub records: usize,
    pub total_bytes: u64,
    pub window_seconds: f64,
    pub endpoints: BTreeMap<String, EndpointRollup>,
    pub memory_alerts: Vec<MemoryAlert>,
    pub monthly_estimate_gb: f64,
    pub budget_percent: f64,
}

/// Rolling window over the last `capacity` responses.
pub struct EgressMonitor {
    capacity: usize,
    records: Mutex<VecDeque<ResponseRecord>>,
}

#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Resident set size of this process; `None` off Linux.
#[must_use]
pub fn resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

impl EgressMonitor {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, record: ResponseRecord) {
        if record.bytes >= LARGE_RESPONSE_BYTES {
            warn!(endpoint = %record.endpoint, bytes = record.bytes, "large response");
        }
        if record.memory_delta_bytes > MEMORY_ALERT_BYTES {
            warn!(
                endpoint = %record.endpoint,
                memory_delta_bytes = record.memory_delta_bytes,
                "memory grew while serving response"
            );
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut endpoints: BTreeMap<String, EndpointRollup> = BTreeMap::new();
        let mut memory_alerts = Vec::new();
        let mut total_bytes = 0_u64;
        for r in records.iter() {
            total_bytes += r.bytes;
            let rollup = endpoints.entry(r.endpoint.clone()).or_default();
            rollup.calls += 1;
            rollup.bytes += r.bytes;
            rollup.max_bytes = rollup.max_bytes.max(r.bytes);
            if r.bytes >= LARGE_RESPONSE_BYTES {
                rollup.large_responses += 1;
            }
            if r.memory_delta_bytes > MEMORY_ALERT_BYTES {
                memory_alerts.push(MemoryAlert {
                    endpoint: r.endpoint.clone(),
                    memory_delta_bytes: r.memory_delta_bytes,
                    at_ms: r.at_ms,
                });
            }
        }
        for rollup in endpoints.values_mut() {
            rollup.mean_bytes = rollup.bytes as f64 / rollup.calls as f64;
        }

        // A window narrower than a second still extrapolates at one second.
        let window_seconds = match (records.front(), records.back()) {
            (Some(first), Some(last)) => ((last.at_ms.saturating_sub(first.at_ms)) as f64 / 1000.0).max(1.0),
            _ => 0.0,
        };
        let monthly_bytes = if window_seconds > 0.0 {
            total_bytes as f64 / window_seconds * SECONDS_PER_MONTH
        } else {
            0.0
        };
        MonitorSnapshot {
            window_size: self.capacity,
            records: records.len(),
            total_bytes,
            window_seconds,
            endpoints,
            memory_alerts,
            monthly_estimate_gb: monthly_bytes / GIB,
            budget_percent: monthly_bytes / MONTHLY_BUDGET_BYTES as f64 * 100.0,
        }
    }
}
