// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Postcode extraction and resolution for free-text component locations.

use std::fmt::{Display, Formatter};

mod client;
mod enrich;
mod extract;
mod limiter;
mod mapping;

pub use client::{
    HttpTransport, OutcodeInfo, PostcodeInfo, PostcodeResolver, PostcodeTransport, Resolution,
    DEFAULT_POSTCODE_API, POSTCODE_HTTP_TIMEOUT,
};
pub use enrich::{enrich_locations, EnrichOptions, EnrichReport};
pub use extract::{
    extract, outward_of, parse_outward_prefix, PostcodeMatches, FULL_POSTCODE_PATTERN,
    OUTWARD_CODE_PATTERN,
};
pub use limiter::{CancelFlag, Clock, RollingMinuteLimiter, SystemClock};
pub use mapping::{MappingMetadata, PostcodeMapping, POSTCODE_MAPPING_FILE};

pub const CRATE_NAME: &str = "cmr-postcode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PostcodeErrorCode {
    Network,
    Decode,
    Io,
    Store,
    Cancelled,
}

impl PostcodeErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::Decode => "decode_error",
            Self::Io => "io_error",
            Self::Store => "store_error",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostcodeError {
    pub code: PostcodeErrorCode,
    pub message: String,
}

impl PostcodeError {
    #[must_use]
    pub fn new(code: PostcodeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for PostcodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PostcodeError {}

impl From<cmr_store::StoreError> for PostcodeError {
    fn from(e: cmr_store::StoreError) -> Self {
        Self::new(PostcodeErrorCode::Store, e.to_string())
    }
}
