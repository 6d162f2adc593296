//! Request-info unmarshalling.
//!
//! Turns the `get-requests` payload into typed [`RequestInfo`] records, one
//! per corpus element, in corpus order.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::polymorphic::PolymorphicUnmarshalSpec;

/// One test case for an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestInfo<R> {
    /// Correlates the case with its expected outcome at the testing service.
    pub container_id: String,
    pub request: R,
}

/// Parse a `get-requests` body into generic JSON maps.
pub fn parse_corpus(body: &[u8]) -> Result<Vec<Map<String, Value>>, DecodeError> {
    serde_json::from_slice(body).map_err(|e| DecodeError::Corpus(e.to_string()))
}

/// Decode every record straight into `RequestInfo<R>`.
pub fn unmarshal_request_info<R>(
    records: &[Map<String, Value>],
) -> Result<Vec<RequestInfo<R>>, DecodeError>
where
    R: DeserializeOwned,
{
    decode_records(records, |raw| {
        R::deserialize(raw).map_err(|e| DecodeError::InvalidRequest(e.to_string()))
    })
}

/// Decode every record, routing polymorphic fields of the request through
/// `spec`.
pub fn unmarshal_polymorphic_request_info<R>(
    records: &[Map<String, Value>],
    spec: &PolymorphicUnmarshalSpec<R>,
) -> Result<Vec<RequestInfo<R>>, DecodeError>
where
    R: DeserializeOwned + 'static,
{
    decode_records(records, |raw| spec.decode_request(raw))
}

fn decode_records<R, F>(
    records: &[Map<String, Value>],
    decode_request: F,
) -> Result<Vec<RequestInfo<R>>, DecodeError>
where
    F: Fn(&Value) -> Result<R, DecodeError>,
{
    let mut decoded = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let container_id = container_id(record, index)?;
        let raw_request = record.get("Request").ok_or_else(|| DecodeError::Record {
            index,
            message: "missing 'Request'".to_string(),
        })?;
        let request = decode_request(raw_request).map_err(|e| e.at_record(index))?;
        tracing::debug!(index, container_id = %container_id, "decoded request record");
        decoded.push(RequestInfo {
            container_id,
            request,
        });
    }
    Ok(decoded)
}

fn container_id(record: &Map<String, Value>, index: usize) -> Result<String, DecodeError> {
    match record.get("ContainerId") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(DecodeError::Record {
            index,
            message: format!("'ContainerId' must be a string, found {}", json_kind(other)),
        }),
        None => Err(DecodeError::Record {
            index,
            message: "missing 'ContainerId'".to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
