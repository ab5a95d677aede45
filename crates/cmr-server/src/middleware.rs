// SPDX-License-Identifier: Apache-2.0

use axum::body::{Body, HttpBody};
use axum::extract::{MatchedPath, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

use crate::monitor::{now_ms, resident_bytes, ResponseRecord};
use crate::AppState;

/// Record bytes on the wire, latency and memory growth per matched route.
pub(crate) async fn track_egress(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let method = request.method().to_string();
    let started = Instant::now();
    let rss_before = resident_bytes();

    let response = next.run(request).await;

    let bytes = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| response.body().size_hint().exact())
        .unwrap_or(0);
    let memory_delta_bytes = match (rss_before, resident_bytes()) {
        (Some(before), Some(after)) => after as i64 - before as i64,
        _ => 0,
    };
    state.monitor.record(ResponseRecord {
        endpoint,
        method,
        bytes,
        duration_ms: started.elapsed().as_millis() as u64,
        memory_delta_bytes,
        at_ms: now_ms(),
    });
    response
}
