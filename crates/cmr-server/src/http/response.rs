// SPDX-License-Identifier: Apache-2.0

use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use cmr_core::MachineError;
use serde::Serialize;
use tracing::error;

use crate::compress::maybe_gzip;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        }
    }
}

/// Every body leaves through here: gzip when worthwhile, explicit length,
/// and the cache outcome in `x-cache`.
pub(crate) fn bytes_response(
    state: &AppState,
    headers: &HeaderMap,
    status: StatusCode,
    content_type: &'static str,
    bytes: Vec<u8>,
    cache: CacheStatus,
) -> Response {
    let (body, encoding) = match maybe_gzip(headers, bytes, state.config.compression_min_bytes) {
        Ok(out) => out,
        Err(e) => {
            error!(error = %e, "gzip encoding failed");
            return plain_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "encoding failed");
        }
    };
    let len = body.len();
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    let h = resp.headers_mut();
    h.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    h.insert(CONTENT_LENGTH, HeaderValue::from(len));
    h.insert(VARY, HeaderValue::from_static("accept-encoding"));
    h.insert("x-cache", HeaderValue::from_static(cache.as_str()));
    if let Some(enc) = encoding {
        h.insert(CONTENT_ENCODING, HeaderValue::from_static(enc));
    }
    resp
}

pub(crate) fn json_response<T: Serialize>(
    state: &AppState,
    headers: &HeaderMap,
    status: StatusCode,
    value: &T,
    cache: CacheStatus,
) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes_response(state, headers, status, "application/json", bytes, cache),
        Err(e) => {
            error!(error = %e, "response serialization failed");
            plain_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "serialization failed")
        }
    }
}

pub(crate) fn error_response(
    state: &AppState,
    headers: &HeaderMap,
    status: StatusCode,
    err: &MachineError,
) -> Response {
    json_response(state, headers, status, err, CacheStatus::Bypass)
}

fn plain_error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, axum::Json(MachineError::new(code, message))).into_response()
}
