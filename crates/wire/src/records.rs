//! Typed records for each endpoint of the testing-service contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Configuration ───────────────────────────────────────────────────

/// Per-request configuration consumed by client factories.
///
/// When `endpoint` is non-empty it wins over `region`. `selectors` carries
/// any auxiliary values the testing service hands out (compartment ids,
/// availability domains, ...); the engine passes them through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TestingConfig {
    pub region: String,
    pub endpoint: String,
    pub selectors: BTreeMap<String, String>,
}

impl TestingConfig {
    /// A configuration that targets a region.
    pub fn for_region(region: impl Into<String>) -> Self {
        TestingConfig {
            region: region.into(),
            ..TestingConfig::default()
        }
    }

    /// A configuration that targets an explicit endpoint.
    pub fn for_endpoint(region: impl Into<String>, endpoint: impl Into<String>) -> Self {
        TestingConfig {
            region: region.into(),
            endpoint: endpoint.into(),
            ..TestingConfig::default()
        }
    }

    /// The endpoint override, if one is set.
    pub fn endpoint_override(&self) -> Option<&str> {
        if self.endpoint.is_empty() {
            None
        } else {
            Some(&self.endpoint)
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Body of `POST /startSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionOpenRequest {
    pub run_id: String,
    pub lang: String,
}

/// Reply of `POST /startSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionOpened {
    pub session_id: String,
    /// Replaces the configured service URL for the rest of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Bearer token to present on every later call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub config: TestingConfig,
}

/// Query string carrying only the session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: String,
}

/// Query string identifying one operation within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationQuery {
    pub session_id: String,
    pub service_name: String,
    pub api_name: String,
}

/// Reply of `GET /isApiEnabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnabledAnswer {
    pub enabled: bool,
}

// ── Corpus ──────────────────────────────────────────────────────────

/// One element of the `GET /request` array.
///
/// `request` is the SDK's on-wire request shape and is decoded per
/// operation by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorpusRecord {
    pub container_id: String,
    pub request: Value,
}

// ── Validation ──────────────────────────────────────────────────────

/// Classification of a dispatch fault on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    Service,
    Transport,
    Cancelled,
}

/// A dispatch fault as reported to the testing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaultRecord {
    pub kind: FaultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opc_request_id: Option<String>,
}

/// Body of `POST /response`.
///
/// `response` is `null` when the dispatch produced no response; for
/// paginated operations it is the array of every page in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationSubmission {
    pub container_id: String,
    pub request: Value,
    pub response: Value,
    pub error: Option<FaultRecord>,
}

/// Reply of `POST /response`. An empty message means the outcome matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationVerdict {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn testing_config_uses_pascal_case_and_defaults() {
        let config: TestingConfig =
            serde_json::from_value(json!({"Region": "us-phoenix-1"})).unwrap();
        assert_eq!(config.region, "us-phoenix-1");
        assert!(config.endpoint.is_empty());
        assert!(config.selectors.is_empty());
        assert_eq!(config.endpoint_override(), None);
    }

    #[test]
    fn endpoint_override_present_when_non_empty() {
        let config = TestingConfig::for_endpoint("us-ashburn-1", "http://localhost:9000");
        assert_eq!(config.endpoint_override(), Some("http://localhost:9000"));
    }

    #[test]
    fn session_opened_optional_fields() {
        let opened: SessionOpened = serde_json::from_value(json!({
            "SessionId": "s-1",
            "Config": {"Region": "eu-frankfurt-1", "Selectors": {"CompartmentId": "ocid1.compartment"}}
        }))
        .unwrap();
        assert_eq!(opened.session_id, "s-1");
        assert!(opened.base_url.is_none());
        assert!(opened.token.is_none());
        assert_eq!(opened.config.selectors["CompartmentId"], "ocid1.compartment");
    }

    #[test]
    fn operation_query_is_camel_case() {
        let query = OperationQuery {
            session_id: "s".into(),
            service_name: "limits".into(),
            api_name: "ListServices".into(),
        };
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"sessionId": "s", "serviceName": "limits", "apiName": "ListServices"})
        );
    }

    #[test]
    fn fault_record_omits_absent_fields() {
        let fault = FaultRecord {
            kind: FaultKind::Cancelled,
            status_code: None,
            code: None,
            message: "operation cancelled".into(),
            opc_request_id: None,
        };
        assert_eq!(
            serde_json::to_value(&fault).unwrap(),
            json!({"Kind": "Cancelled", "Message": "operation cancelled"})
        );
    }

    #[test]
    fn submission_carries_null_error() {
        let submission = ValidationSubmission {
            container_id: "c-1".into(),
            request: json!({"LimitId": "x"}),
            response: json!(null),
            error: None,
        };
        let value = serde_json::to_value(&submission).unwrap();
        assert_eq!(value["ContainerId"], "c-1");
        assert!(value["Error"].is_null());
        assert!(value["Response"].is_null());
    }

    #[test]
    fn verdict_message_defaults_to_empty() {
        let verdict: ValidationVerdict = serde_json::from_value(json!({})).unwrap();
        assert!(verdict.message.is_empty());
    }
}
