// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Prepare,
    Fetch,
    Transform,
    Persist,
    Finalize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobEvent {
    pub stage: JobStage,
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

/// Structured stage events a batch job returns alongside its report.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobLog {
    events: Vec<JobEvent>,
}

impl JobLog {
    pub fn emit(&mut self, stage: JobStage, name: impl Into<String>, fields: BTreeMap<String, String>) {
        self.events.push(JobEvent {
            stage,
            name: name.into(),
            fields,
        });
    }

    #[must_use]
    pub fn events(&self) -> &[JobEvent] {
        &self.events
    }

    #[must_use]
    pub fn last(&self, stage: JobStage) -> Option<&JobEvent> {
        self.events.iter().rev().find(|e| e.stage == stage)
    }
}

/// Build an event field map from `(key, value)` pairs.
#[must_use]
pub fn fields<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
