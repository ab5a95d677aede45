// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::limiter::{CancelFlag, Clock, RollingMinuteLimiter, SystemClock};
use crate::{PostcodeError, PostcodeErrorCode};

pub const DEFAULT_POSTCODE_API: &str = "https://api.postcodes.io";
pub const POSTCODE_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// One GET against the postcode service. `Ok(None)` means the service
/// answered with anything other than 200.
pub trait PostcodeTransport: Send {
    fn get_json(&self, path: &str) -> Result<Option<Value>, PostcodeError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, PostcodeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(POSTCODE_HTTP_TIMEOUT)
            .build()
            .map_err(|e| PostcodeError::new(PostcodeErrorCode::Network, e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl PostcodeTransport for HttpTransport {
    fn get_json(&self, path: &str) -> Result<Option<Value>, PostcodeError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| PostcodeError::new(PostcodeErrorCode::Network, e.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            debug!(url = %url, status = response.status().as_u16(), "postcode lookup not found");
            return Ok(None);
        }
        response
            .json::<Value>()
            .map(Some)
            .map_err(|e| PostcodeError::new(PostcodeErrorCode::Decode, e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeInfo {
    pub postcode: String,
    pub outcode: String,
    pub county: Option<String>,
    pub district: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcodeInfo {
    pub outcode: String,
    #[serde(default)]
    pub districts: Vec<String>,
    #[serde(default)]
    pub counties: Vec<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl OutcodeInfo {
    /// First admin county, else first admin district.
    #[must_use]
    pub fn county(&self) -> Option<&str> {
        self.counties
            .first()
            .or_else(|| self.districts.first())
            .map(String::as_str)
    }
}

/// Outcome of one lookup. Nothing the service does turns into an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Found(T),
    /// The service answered and does not know the code.
    NotFound,
    /// Network, decode or cancellation failure; worth retrying later.
    Failed(String),
}

impl<T> Resolution<T> {
    #[must_use]
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            _ => None,
        }
    }
}

pub struct PostcodeResolver {
    transport: Box<dyn PostcodeTransport>,
    limiter: RollingMinuteLimiter,
    api_calls: u64,
}

impl PostcodeResolver {
    #[must_use]
    pub fn new(
        transport: Box<dyn PostcodeTransport>,
        requests_per_minute: u32,
        clock: Arc<dyn Clock>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            transport,
            limiter: RollingMinuteLimiter::new(requests_per_minute, clock, cancel),
            api_calls: 0,
        }
    }

    pub fn http(base_url: &str, requests_per_minute: u32, cancel: CancelFlag) -> Result<Self, PostcodeError> {
        Ok(Self::new(
            Box::new(HttpTransport::new(base_url)?),
            requests_per_minute,
            Arc::new(SystemClock),
            cancel,
        ))
    }

    #[must_use]
    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    pub fn resolve_postcode(&mut self, postcode: &str) -> Resolution<PostcodeInfo> {
        match self.fetch(&format!("postcodes/{}", encode_segment(postcode))) {
            Resolution::Found(result) => {
                let county = text(&result, "admin_county").or_else(|| text(&result, "admin_district"));
                let info = PostcodeInfo {
                    postcode: text(&result, "postcode").unwrap_or_else(|| postcode.to_string()),
                    outcode: text(&result, "outcode")
                        .or_else(|| crate::outward_of(postcode).map(str::to_string))
                        .unwrap_or_default(),
                    county,
                    district: text(&result, "admin_district"),
                    region: text(&result, "region"),
                    latitude: result.get("latitude").and_then(Value::as_f64),
                    longitude: result.get("longitude").and_then(Value::as_f64),
                };
                Resolution::Found(info)
            }
            Resolution::NotFound => Resolution::NotFound,
            Resolution::Failed(reason) => Resolution::Failed(reason),
        }
    }

    pub fn resolve_outcode(&mut self, outcode: &str) -> Resolution<OutcodeInfo> {
        match self.fetch(&format!("outcodes/{}", encode_segment(outcode))) {
            Resolution::Found(result) => Resolution::Found(OutcodeInfo {
                outcode: text(&result, "outcode").unwrap_or_else(|| outcode.to_string()),
                districts: text_list(result.get("admin_district")),
                counties: text_list(result.get("admin_county")),
                region: text_list(result.get("region")).into_iter().next(),
                latitude: result.get("latitude").and_then(Value::as_f64),
                longitude: result.get("longitude").and_then(Value::as_f64),
            }),
            Resolution::NotFound => Resolution::NotFound,
            Resolution::Failed(reason) => Resolution::Failed(reason),
        }
    }

    fn fetch(&mut self, path: &str) -> Resolution<Value> {
        if let Err(e) = self.limiter.acquire() {
            return Resolution::Failed(e.to_string());
        }
        self.api_calls += 1;
        match self.transport.get_json(path) {
            Ok(Some(body)) => match body.get("result") {
                Some(result) if result.is_object() => Resolution::Found(result.clone()),
                _ => Resolution::NotFound,
            },
            Ok(None) => Resolution::NotFound,
            Err(e) => {
                warn!(path, error = %e, "postcode lookup failed");
                Resolution::Failed(e.to_string())
            }
        }
    }
}

fn text(result: &Value, key: &str) -> Option<String> {
    result
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// Outcode answers carry arrays where postcode answers carry strings.
fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn encode_segment(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c.to_ascii_uppercase().to_string()),
            ' ' => Some("%20".to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::tests::ManualClock;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct Canned {
        answers: BTreeMap<String, Value>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl PostcodeTransport for Canned {
        fn get_json(&self, path: &str) -> Result<Option<Value>, PostcodeError> {
            self.seen.lock().expect("seen").push(path.to_string());
            if path.contains("BROKEN") {
                return Err(PostcodeError::new(PostcodeErrorCode::Network, "connection reset"));
            }
            Ok(self.answers.get(path).cloned())
        }
    }

    fn resolver(answers: BTreeMap<String, Value>) -> (PostcodeResolver, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = Canned {
            answers,
            seen: seen.clone(),
        };
        let resolver = PostcodeResolver::new(
            Box::new(transport),
            60,
            Arc::new(ManualClock::new()),
            CancelFlag::default(),
        );
        (resolver, seen)
    }

    #[test]
    fn postcode_county_falls_back_to_district() {
        let answers = BTreeMap::from([(
            "postcodes/SW11%205BP".to_string(),
            json!({"status": 200, "result": {
                "postcode": "SW11 5BP", "outcode": "SW11", "admin_county": null,
                "admin_district": "Wandsworth", "region": "London",
                "latitude": 51.46, "longitude": -0.16
            }}),
        )]);
        let (mut r, seen) = resolver(answers);
        let info = r.resolve_postcode("sw11 5bp").found().expect("found");
        assert_eq!(info.outcode, "SW11");
        assert_eq!(info.county.as_deref(), Some("Wandsworth"));
        assert_eq!(info.region.as_deref(), Some("London"));
        assert_eq!(seen.lock().expect("seen").as_slice(), ["postcodes/SW11%205BP"]);
        assert_eq!(r.api_calls(), 1);
    }

    #[test]
    fn outcode_lists_are_parsed() {
        let answers = BTreeMap::from([(
            "outcodes/KA1".to_string(),
            json!({"result": {
                "outcode": "KA1", "admin_county": [], "admin_district": ["East Ayrshire", "South Ayrshire"],
                "region": ["Scotland"], "latitude": 55.6, "longitude": -4.5
            }}),
        )]);
        let (mut r, _) = resolver(answers);
        let info = r.resolve_outcode("KA1").found().expect("found");
        assert_eq!(info.county(), Some("East Ayrshire"));
        assert_eq!(info.region.as_deref(), Some("Scotland"));
    }

    #[test]
    fn failures_never_escape() {
        let (mut r, _) = resolver(BTreeMap::new());
        assert_eq!(r.resolve_outcode("ZZ9"), Resolution::NotFound);
        assert!(matches!(r.resolve_postcode("BROKEN 1AA"), Resolution::Failed(_)));
    }
}
