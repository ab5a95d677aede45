// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use cmr_core::MachineError;
use cmr_model::{
    INDEX_FILE, LOCATION_COMPONENTS_FILE, LOCATION_COORDINATES_FILE, OUTWARD_LOCATIONS_FILE,
    TRIGRAM_LOCATIONS_FILE,
};
use cmr_query::{
    company_suggestions, component_raw, location_detail, map_features, SearchPage, SearchParams,
    SearchRequest, DEFAULT_PER_PAGE, DEFAULT_SUGGESTION_LIMIT,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::response::{bytes_response, error_response, json_response, CacheStatus};
use super::{search_payload, ROUTE_COMPONENT_RAW, ROUTE_LOCATION, ROUTE_MAP, ROUTE_SEARCH, ROUTE_SUGGEST};
use crate::cache::{cache_key, CacheTier};
use crate::{with_store, AppState, ServerError};

const MAX_SUGGESTIONS: usize = 25;
const STATIC_ARTIFACTS: [&str; 5] = [
    INDEX_FILE,
    OUTWARD_LOCATIONS_FILE,
    LOCATION_COORDINATES_FILE,
    TRIGRAM_LOCATIONS_FILE,
    LOCATION_COMPONENTS_FILE,
];

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SuggestParams {
    pub q: Option<String>,
    pub limit: Option<String>,
}

pub(crate) async fn healthz_handler() -> &'static str {
    "ok"
}

/// List endpoint. Failures answer with the flagged empty page, never an
/// error status, and are not cached.
pub(crate) async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let req = SearchRequest::from_params(&params, state.config.core.per_page_cap);
    let key = cache_key(ROUTE_SEARCH, &req.fingerprint());
    if let Some(hit) = state.cache.get(&key).await {
        return bytes_response(&state, &headers, StatusCode::OK, "application/json", hit, CacheStatus::Hit);
    }
    match search_payload(&state, req.clone()).await {
        Ok(bytes) => {
            state.cache.set(&key, CacheTier::Medium, &bytes).await;
            bytes_response(&state, &headers, StatusCode::OK, "application/json", bytes, CacheStatus::Miss)
        }
        Err(e) => {
            warn!(error = %e, q = %req.q, "search failed; serving empty page");
            let page = SearchPage::empty(&req, e.code.as_str());
            json_response(&state, &headers, StatusCode::OK, &page, CacheStatus::Bypass)
        }
    }
}

pub(crate) async fn map_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let mut req = SearchRequest::from_params(&params, state.config.core.per_page_cap);
    req.page = 1;
    req.per_page = DEFAULT_PER_PAGE;
    let limit = state.config.map_feature_limit;
    let key = cache_key(ROUTE_MAP, &format!("{}|limit={limit}", req.fingerprint()));
    if let Some(hit) = state.cache.get(&key).await {
        return bytes_response(&state, &headers, StatusCode::OK, "application/geo+json", hit, CacheStatus::Hit);
    }
    let result = with_store(&state, move |store, env| {
        Ok(map_features(store.connection(), &req, limit, &env.search_context())?)
    }).await;
    let collection = match result {
        Ok(collection) => collection,
        Err(e) => {
            warn!(error = %e, "map query failed; serving empty collection");
            let empty = json!({
                "type": "FeatureCollection",
                "features": [],
                "truncated": false,
                "error": e.code.as_str(),
            });
            return json_response(&state, &headers, StatusCode::OK, &empty, CacheStatus::Bypass);
        }
    };
    match serde_json::to_vec(&collection) {
        Ok(bytes) => {
            state.cache.set(&key, CacheTier::Long, &bytes).await;
            bytes_response(&state, &headers, StatusCode::OK, "application/geo+json", bytes, CacheStatus::Miss)
        }
        Err(e) => internal(&state, &headers, &e.to_string()),
    }
}

pub(crate) async fn location_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let key = cache_key(ROUTE_LOCATION, &id.to_string());
    if let Some(hit) = state.cache.get(&key).await {
        return bytes_response(&state, &headers, StatusCode::OK, "application/json", hit, CacheStatus::Hit);
    }
    let found = with_store(&state, move |store, _| Ok(location_detail(store.connection(), id)?)).await;
    cache_found(&state, &headers, &key, found, "location", &id.to_string()).await
}

/// Raw upstream fields, fetched only on request and kept out of every list
/// payload.
pub(crate) async fn component_raw_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let key = cache_key(ROUTE_COMPONENT_RAW, &id);
    if let Some(hit) = state.cache.get(&key).await {
        return bytes_response(&state, &headers, StatusCode::OK, "application/json", hit, CacheStatus::Hit);
    }
    let lookup = id.clone();
    let found = with_store(&state, move |store, _| Ok(component_raw(store, &lookup)?)).await;
    cache_found(&state, &headers, &key, found, "component", &id).await
}

pub(crate) async fn suggest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SuggestParams>,
) -> Response {
    let q = params.q.unwrap_or_default();
    let limit = params
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_SUGGESTION_LIMIT)
        .min(MAX_SUGGESTIONS);
    let key = cache_key(ROUTE_SUGGEST, &format!("q={}|limit={limit}", q.trim().to_lowercase()));
    if let Some(hit) = state.cache.get(&key).await {
        return bytes_response(&state, &headers, StatusCode::OK, "application/json", hit, CacheStatus::Hit);
    }
    let result = with_store(&state, move |store, env| {
        Ok(company_suggestions(store.connection(), &q, limit, env.activation_threshold)?)
    }).await;
    match result {
        Ok(suggestions) => match serde_json::to_vec(&json!({ "suggestions": suggestions })) {
            Ok(bytes) => {
                state.cache.set(&key, CacheTier::Short, &bytes).await;
                bytes_response(&state, &headers, StatusCode::OK, "application/json", bytes, CacheStatus::Miss)
            }
            Err(e) => internal(&state, &headers, &e.to_string()),
        },
        Err(e) => {
            warn!(error = %e, "company suggestions failed");
            json_response(
                &state,
                &headers,
                StatusCode::OK,
                &json!({ "suggestions": [], "error": e.code.as_str() }),
                CacheStatus::Bypass,
            )
        }
    }
}

pub(crate) async fn monitor_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let memory = state.cache.check_memory().await;
    let body = json!({
        "egress": state.monitor.snapshot(),
        "cache": state.cache.stats(),
        "memory": memory,
    });
    json_response(&state, &headers, StatusCode::OK, &body, CacheStatus::Bypass)
}

/// Only the generated artifact files are served; any other name is a 404.
pub(crate) async fn static_artifact_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let not_found = |state: &AppState| {
        error_response(
            state,
            &headers,
            StatusCode::NOT_FOUND,
            &MachineError::new("not_found", "static artifact not found").with_detail("name", &name),
        )
    };
    let Some(dir) = state.config.static_cache_dir.clone() else {
        return not_found(&state);
    };
    if !STATIC_ARTIFACTS.contains(&name.as_str()) {
        return not_found(&state);
    }
    let path = dir.join(&name);
    match tokio::task::spawn_blocking(move || std::fs::read(path)).await {
        Ok(Ok(bytes)) => bytes_response(&state, &headers, StatusCode::OK, "application/json", bytes, CacheStatus::Bypass),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => not_found(&state),
        Ok(Err(e)) => internal(&state, &headers, &e.to_string()),
        Err(e) => internal(&state, &headers, &e.to_string()),
    }
}

async fn cache_found<T: serde::Serialize>(
    state: &AppState,
    headers: &HeaderMap,
    key: &str,
    found: Result<Option<T>, ServerError>,
    kind: &str,
    id: &str,
) -> Response {
    match found {
        Ok(Some(value)) => match serde_json::to_vec(&value) {
            Ok(bytes) => {
                state.cache.set(key, CacheTier::Long, &bytes).await;
                bytes_response(state, headers, StatusCode::OK, "application/json", bytes, CacheStatus::Miss)
            }
            Err(e) => internal(state, headers, &e.to_string()),
        },
        Ok(None) => error_response(
            state,
            headers,
            StatusCode::NOT_FOUND,
            &MachineError::new("not_found", &format!("{kind} not found")).with_detail("id", id),
        ),
        Err(e) => {
            warn!(error = %e, kind, id, "detail lookup failed");
            error_response(
                state,
                headers,
                StatusCode::SERVICE_UNAVAILABLE,
                &MachineError::new(e.code.as_str(), "lookup unavailable"),
            )
        }
    }
}

fn internal(state: &AppState, headers: &HeaderMap, message: &str) -> Response {
    warn!(error = %message, "response build failed");
    error_response(
        state,
        headers,
        StatusCode::INTERNAL_SERVER_ERROR,
        &MachineError::new("internal_error", "response build failed"),
    )
}
