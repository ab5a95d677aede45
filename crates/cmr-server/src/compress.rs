// SPDX-License-Identifier: Apache-2.0

use axum::http::HeaderMap;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| {
            accept
                .split(',')
                .any(|part| part.split(';').next().is_some_and(|enc| enc.trim() == "gzip"))
        })
}

/// Gzip `bytes` when the client accepts it and the body is at least
/// `min_bytes`; returns the body to send and its encoding.
pub fn maybe_gzip(
    headers: &HeaderMap,
    bytes: Vec<u8>,
    min_bytes: usize,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    if bytes.len() < min_bytes || !accepts_gzip(headers) {
        return Ok((bytes, None));
    }
    let mut encoder = GzEncoder::new(
        Vec::with_capacity((bytes.len() / 2).max(256)),
        Compression::fast(),
    );
    encoder.write_all(&bytes)?;
    Ok((encoder.finish()?, Some("gzip")))
}
