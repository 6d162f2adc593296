use autotest_wire::{FaultKind, FaultRecord};

use crate::controller::SessionPhase;

/// Failure talking to the external testing service. Fatal for the run when
/// raised while opening or closing the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionFault {
    /// The service could not be reached or the connection broke.
    #[error("testing service {endpoint}: transport error: {message}")]
    Transport { endpoint: String, message: String },

    /// The service answered with a non-success status code.
    #[error("testing service {endpoint}: http status {status}")]
    Status { endpoint: String, status: u16 },

    /// The reply body did not have the expected shape.
    #[error("testing service {endpoint}: malformed reply: {message}")]
    Malformed { endpoint: String, message: String },

    /// The controller was asked to do something its current phase forbids.
    #[error("cannot {action} while the session is {phase}")]
    InvalidState {
        action: &'static str,
        phase: SessionPhase,
    },

    /// The blocking task that performed the call did not complete.
    #[error("testing service call did not complete: {0}")]
    Join(String),
}

/// The corpus or one of its discriminators is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The `get-requests` payload is not an array of JSON objects.
    #[error("request corpus is not an array of objects: {0}")]
    Corpus(String),

    /// A single corpus record is missing a key or has the wrong type.
    #[error("record {index}: {message}")]
    Record { index: usize, message: String },

    /// The `Request` value of a record does not match the request type.
    #[error("invalid 'Request': {0}")]
    InvalidRequest(String),

    /// The polymorphic object has no discriminator, or it is empty or not a string.
    #[error("{base}: discriminator '{field}' is missing or empty")]
    MissingDiscriminator { base: String, field: String },

    /// The discriminator names a variant the decoder does not know.
    #[error("{base}: unknown value '{value}' for discriminator '{field}'")]
    UnknownDiscriminator {
        base: String,
        field: String,
        value: String,
    },

    /// A non-optional polymorphic slot is absent from the request.
    #[error("{base}: required field '{field}' is absent")]
    MissingSlot { base: String, field: String },

    /// The polymorphic value is not a JSON object.
    #[error("{base}: expected a JSON object")]
    NotAnObject { base: String },

    /// The selected variant could not be populated from the JSON object.
    #[error("{base}: cannot decode variant '{value}': {message}")]
    Variant {
        base: String,
        value: String,
        message: String,
    },
}

impl DecodeError {
    /// Attach a record index to an error raised while decoding that record.
    pub(crate) fn at_record(self, index: usize) -> DecodeError {
        match self {
            DecodeError::Record { .. } | DecodeError::Corpus(_) => self,
            other => DecodeError::Record {
                index,
                message: other.to_string(),
            },
        }
    }
}

/// The SDK returned an error from a call. Passed to validation; the
/// testing service decides whether it was expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFault {
    #[error("service error {status} {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
        opc_request_id: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl DispatchFault {
    /// The wire form sent to the testing service.
    pub fn to_record(&self) -> FaultRecord {
        match self {
            DispatchFault::Service {
                status,
                code,
                message,
                opc_request_id,
            } => FaultRecord {
                kind: FaultKind::Service,
                status_code: Some(*status),
                code: Some(code.clone()),
                message: message.clone(),
                opc_request_id: opc_request_id.clone(),
            },
            DispatchFault::Transport(message) => FaultRecord {
                kind: FaultKind::Transport,
                status_code: None,
                code: None,
                message: message.clone(),
                opc_request_id: None,
            },
            DispatchFault::Cancelled => FaultRecord {
                kind: FaultKind::Cancelled,
                status_code: None,
                code: None,
                message: self.to_string(),
                opc_request_id: None,
            },
        }
    }
}

/// Failure obtaining an SDK client for an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("configuration provider: {0}")]
    Config(String),

    #[error("cannot construct client: {0}")]
    Construct(String),

    #[error("no client factory registered for {service}/{operation}")]
    NotRegistered { service: String, operation: String },

    #[error("client factory for {service}/{operation} builds a different client type")]
    WrongClientKind { service: String, operation: String },
}

/// Anything that fails a single operation test before or around dispatch.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Session(#[from] SessionFault),

    #[error("failed to decode requests: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to create client: {0}")]
    Client(#[from] ClientError),
}

/// Failure loading [`HarnessSettings`](crate::HarnessSettings).
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_fault_record_carries_status_and_code() {
        let fault = DispatchFault::Service {
            status: 404,
            code: "NotAuthorizedOrNotFound".into(),
            message: "resource not found".into(),
            opc_request_id: Some("req-1".into()),
        };
        let record = fault.to_record();
        assert_eq!(record.kind, FaultKind::Service);
        assert_eq!(record.status_code, Some(404));
        assert_eq!(record.code.as_deref(), Some("NotAuthorizedOrNotFound"));
        assert_eq!(record.opc_request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn cancelled_fault_record() {
        let record = DispatchFault::Cancelled.to_record();
        assert_eq!(record.kind, FaultKind::Cancelled);
        assert_eq!(record.message, "operation cancelled");
    }

    #[test]
    fn at_record_wraps_discriminator_errors() {
        let err = DecodeError::UnknownDiscriminator {
            base: "CreateDatabaseBase".into(),
            field: "source".into(),
            value: "CLONE".into(),
        }
        .at_record(3);
        match err {
            DecodeError::Record { index, message } => {
                assert_eq!(index, 3);
                assert!(message.contains("unknown value 'CLONE'"));
            }
            other => panic!("expected Record, got {:?}", other),
        }
    }

    #[test]
    fn at_record_keeps_existing_index() {
        let err = DecodeError::Record {
            index: 1,
            message: "missing 'ContainerId'".into(),
        };
        assert_eq!(err.clone().at_record(7), err);
    }
}
