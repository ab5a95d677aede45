// SPDX-License-Identifier: Apache-2.0

use cmr_model::FreshnessDecision;
use std::time::Duration;
use tracing::{info, warn};

use crate::{FreshnessError, FreshnessErrorCode};

pub const SUBJECT_NEW_AUCTION: &str = "CMR ALERT: new auction data";
pub const SUBJECT_INVESTIGATE: &str = "CMR ALERT: investigate";
pub const SUBJECT_LARGE_CHANGE: &str = "CMR ALERT: large change";
pub const SUBJECT_WEEKLY: &str = "CMR Weekly Summary";

/// Component delta above which a quiet run still mails at once.
pub const DEFAULT_LARGE_DELTA: u64 = 1000;
pub const ENV_LARGE_DELTA: &str = "CMR_FRESHNESS_LARGE_DELTA";

pub const ENV_MAILGUN_DOMAIN: &str = "MAILGUN_DOMAIN";
pub const ENV_MAILGUN_API_KEY: &str = "MAILGUN_API_KEY";
pub const ENV_ADMIN_EMAIL: &str = "ADMIN_EMAIL";
pub const ENV_FROM_EMAIL: &str = "FROM_EMAIL";

const MAILGUN_API: &str = "https://api.mailgun.net/v3";
const MAIL_TIMEOUT: Duration = Duration::from_secs(15);

/// Where freshness notifications go.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, subject: &str, body: &str) -> Result<(), FreshnessError>;
}

/// Record counts that can escalate an otherwise quiet run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDeltas {
    /// `upstream - local`.
    pub upstream: i64,
    /// Local count minus the baseline's.
    pub baseline: Option<i64>,
    pub large_threshold: u64,
}

impl AlertDeltas {
    /// The largest delta past the threshold, if any.
    #[must_use]
    pub fn large(&self) -> Option<i64> {
        [Some(self.upstream), self.baseline]
            .into_iter()
            .flatten()
            .filter(|d| d.unsigned_abs() > self.large_threshold)
            .max_by_key(|d| d.unsigned_abs())
    }
}

/// Subject for this run, or `None` when nothing should be sent. Alerts,
/// updates and large deltas go out immediately; other quiet outcomes only on
/// the weekly cadence.
#[must_use]
pub fn alert_subject(decision: FreshnessDecision, deltas: AlertDeltas, weekly_due: bool) -> Option<String> {
    match decision {
        FreshnessDecision::NewAuction => Some(SUBJECT_NEW_AUCTION.to_string()),
        FreshnessDecision::Investigate => Some(SUBJECT_INVESTIGATE.to_string()),
        FreshnessDecision::Update => Some(format!("CMR Update: {}", decision.as_str())),
        FreshnessDecision::Current | FreshnessDecision::DuplicateArtifact => match deltas.large() {
            Some(delta) => Some(format!("{SUBJECT_LARGE_CHANGE} ({delta:+} components)")),
            None => weekly_due.then(|| SUBJECT_WEEKLY.to_string()),
        },
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, subject: &str, body: &str) -> Result<(), FreshnessError> {
        info!(subject = %subject, body = %body, "freshness notification");
        Ok(())
    }
}

pub struct MailgunSink {
    client: reqwest::blocking::Client,
    domain: String,
    api_key: String,
    from: String,
    to: String,
}

impl MailgunSink {
    pub fn new(domain: &str, api_key: &str, from: &str, to: &str) -> Result<Self, FreshnessError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(MAIL_TIMEOUT)
            .build()
            .map_err(|e| FreshnessError::new(FreshnessErrorCode::Alert, e.to_string()))?;
        Ok(Self {
            client,
            domain: domain.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// `None` unless domain, key and recipient are all configured.
    pub fn from_env() -> Result<Option<Self>, FreshnessError> {
        let (Some(domain), Some(key), Some(to)) = (
            cmr_core::env::env_string(ENV_MAILGUN_DOMAIN),
            cmr_core::env::env_string(ENV_MAILGUN_API_KEY),
            cmr_core::env::env_string(ENV_ADMIN_EMAIL),
        ) else {
            return Ok(None);
        };
        let from = cmr_core::env::env_string(ENV_FROM_EMAIL).unwrap_or_else(|| format!("cmr@{domain}"));
        Self::new(&domain, &key, &from, &to).map(Some)
    }
}

impl AlertSink for MailgunSink {
    fn name(&self) -> &'static str {
        "mailgun"
    }

    fn send(&self, subject: &str, body: &str) -> Result<(), FreshnessError> {
        let url = format!("{MAILGUN_API}/{}/messages", self.domain);
        let response = self
            .client
            .post(url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from.as_str()),
                ("to", self.to.as_str()),
                ("subject", subject),
                ("text", body),
            ])
            .send()
            .map_err(|e| FreshnessError::new(FreshnessErrorCode::Alert, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "mail provider refused notification");
            return Err(FreshnessError::new(
                FreshnessErrorCode::Alert,
                format!("mail provider answered {}", status.as_u16()),
            ));
        }
        Ok(())
    }
}
