// SPDX-License-Identifier: Apache-2.0

use cmr_model::UpstreamRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::{IngestError, IngestErrorCode};

pub const DEFAULT_UPSTREAM_API: &str = "https://api.neso.energy/api/3/action/datastore_search";
pub const COMPONENT_RESOURCE_ID: &str = "790f5fa0-f8eb-4d82-b98d-0d34d3e404e8";
pub const CMU_RESOURCE_ID: &str = "25a5fa2e-873d-41c5-8aaf-fbc2b06d79e6";
pub const UPSTREAM_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatastoreQuery {
    pub resource_id: String,
    pub limit: u64,
    pub offset: u64,
    pub q: Option<String>,
    /// Exact-match field filters, sent as a JSON object.
    pub filters: BTreeMap<String, String>,
}

impl DatastoreQuery {
    #[must_use]
    pub fn page(resource_id: &str, limit: u64, offset: u64) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            limit,
            offset,
            ..Self::default()
        }
    }

    /// `limit=0`: only the total is wanted.
    #[must_use]
    pub fn total(resource_id: &str) -> Self {
        Self::page(resource_id, 0, 0)
    }

    #[must_use]
    pub fn with_filter(mut self, field: &str, value: &str) -> Self {
        self.filters.insert(field.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatastorePage {
    pub total: Option<u64>,
    pub records: Vec<UpstreamRecord>,
}

/// The upstream datastore-search endpoint.
pub trait UpstreamApi: Send + Sync {
    fn datastore_search(&self, query: &DatastoreQuery) -> Result<DatastorePage, IngestError>;
}

/// Decode `{success, result: {total, records}}`. Records that are not JSON
/// objects are dropped here; the caller counts what arrives.
pub fn parse_envelope(body: &Value) -> Result<DatastorePage, IngestError> {
    if body.get("success").and_then(Value::as_bool) != Some(true) {
        let detail = body
            .get("error")
            .map(Value::to_string)
            .unwrap_or_else(|| "success flag not set".to_string());
        return Err(IngestError::new(IngestErrorCode::Upstream, detail));
    }
    let result = body
        .get("result")
        .ok_or_else(|| IngestError::new(IngestErrorCode::Upstream, "envelope missing `result`"))?;
    let total = result.get("total").and_then(Value::as_u64);
    let records = result
        .get("records")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default();
    Ok(DatastorePage { total, records })
}

pub struct HttpUpstream {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpUpstream {
    pub fn new(endpoint: &str) -> Result<Self, IngestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(UPSTREAM_HTTP_TIMEOUT)
            .build()
            .map_err(|e| IngestError::new(IngestErrorCode::Network, e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl UpstreamApi for HttpUpstream {
    fn datastore_search(&self, query: &DatastoreQuery) -> Result<DatastorePage, IngestError> {
        let mut params: Vec<(&str, String)> = vec![
            ("resource_id", query.resource_id.clone()),
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(q) = &query.q {
            params.push(("q", q.clone()));
        }
        if !query.filters.is_empty() {
            let filters = serde_json::to_string(&query.filters)
                .map_err(|e| IngestError::new(IngestErrorCode::Upstream, e.to_string()))?;
            params.push(("filters", filters));
        }
        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .map_err(|e| IngestError::new(IngestErrorCode::Network, e.to_string()))?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IngestError::new(
                IngestErrorCode::Network,
                format!("upstream answered {}", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(IngestError::new(
                IngestErrorCode::Upstream,
                format!("upstream answered {}", status.as_u16()),
            ));
        }
        let body: Value = response
            .json()
            .map_err(|e| IngestError::new(IngestErrorCode::Network, e.to_string()))?;
        debug!(resource = %query.resource_id, offset = query.offset, "datastore page fetched");
        parse_envelope(&body)
    }
}
