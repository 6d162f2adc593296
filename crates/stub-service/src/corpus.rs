//! The corpus a stub service answers from, and its validation rules.

use std::collections::BTreeSet;
use std::path::Path;

use autotest_wire::{CorpusRecord, FaultRecord, TestingConfig, ValidationSubmission};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure loading a corpus file.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("cannot read corpus {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid corpus: {0}")]
    Parse(String),
}

/// Everything the stub knows about a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StubCorpus {
    /// Returned to every session that is opened.
    #[serde(default)]
    pub config: TestingConfig,
    #[serde(default)]
    pub operations: Vec<OperationCorpus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationCorpus {
    pub service: String,
    pub operation: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub records: Vec<StubRecord>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StubRecord {
    pub container_id: String,
    pub request: Value,
    #[serde(default)]
    pub expected: Expectation,
}

/// What a correct dispatch of a record looks like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Expectation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ExpectedFault>,
}

/// An expected service error; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpectedFault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ExpectedFault {
    fn matches(&self, fault: &FaultRecord) -> bool {
        self.status_code.map_or(true, |s| fault.status_code == Some(s))
            && self
                .code
                .as_deref()
                .map_or(true, |c| fault.code.as_deref() == Some(c))
    }

    fn describe(&self) -> String {
        describe_fault(self.status_code, self.code.as_deref())
    }
}

fn describe_fault(status: Option<u16>, code: Option<&str>) -> String {
    match (status, code) {
        (Some(status), Some(code)) => format!("{} {}", status, code),
        (Some(status), None) => status.to_string(),
        (None, Some(code)) => code.to_string(),
        (None, None) => "any fault".to_string(),
    }
}

impl StubCorpus {
    pub fn from_json(bytes: &[u8]) -> Result<Self, CorpusError> {
        serde_json::from_slice(bytes).map_err(|e| CorpusError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, CorpusError> {
        let bytes = std::fs::read(path).map_err(|source| CorpusError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&bytes)
    }

    pub fn operation(&self, service: &str, operation: &str) -> Option<&OperationCorpus> {
        self.operations
            .iter()
            .find(|o| o.service == service && o.operation == operation)
    }

    /// Unknown operations are disabled.
    pub fn is_enabled(&self, service: &str, operation: &str) -> bool {
        self.operation(service, operation)
            .is_some_and(|o| o.enabled)
    }

    /// The `get-requests` payload for an operation; empty when unknown.
    pub fn requests(&self, service: &str, operation: &str) -> Vec<CorpusRecord> {
        self.operation(service, operation)
            .map(|o| {
                o.records
                    .iter()
                    .map(|r| CorpusRecord {
                        container_id: r.container_id.clone(),
                        request: r.request.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn record(&self, container_id: &str) -> Option<&StubRecord> {
        self.operations
            .iter()
            .flat_map(|o| o.records.iter())
            .find(|r| r.container_id == container_id)
    }

    /// Judge one submission. Empty means accepted.
    pub fn check(&self, submission: &ValidationSubmission) -> String {
        let Some(record) = self.record(&submission.container_id) else {
            return format!("unknown container '{}'", submission.container_id);
        };
        let expected = &record.expected;

        match (&expected.fault, &submission.error) {
            (Some(want), None) => {
                return format!("expected fault {} but the call succeeded", want.describe())
            }
            (Some(want), Some(got)) if !want.matches(got) => {
                return format!(
                    "expected fault {}, got {}",
                    want.describe(),
                    describe_fault(got.status_code, got.code.as_deref())
                )
            }
            (Some(_), Some(_)) => return String::new(),
            (None, Some(got)) => return format!("unexpected fault: {}", got.message),
            (None, None) => {}
        }

        match expected.response {
            Some(ref want) => response_mismatch(want, &submission.response).unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Names the first top-level key whose value differs.
fn response_mismatch(want: &Value, got: &Value) -> Option<String> {
    if want == got {
        return None;
    }
    match (want, got) {
        (Value::Object(want), Value::Object(got)) => {
            let keys: BTreeSet<&String> = want.keys().chain(got.keys()).collect();
            keys.into_iter()
                .find(|key| want.get(*key) != got.get(*key))
                .map(|key| {
                    format!(
                        "response mismatch at '{}': expected {} got {}",
                        key,
                        render(want.get(key)),
                        render(got.get(key))
                    )
                })
        }
        _ => Some(format!("response mismatch: expected {} got {}", want, got)),
    }
}

fn render(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "nothing".to_string(),
    }
}
