//! Client side of the external testing service.
//!
//! [`TestingService`] is the seam between the controller and the wire:
//! [`http::HttpTestingService`] speaks the HTTP contract, tests substitute
//! in-memory implementations.

pub mod http;

use async_trait::async_trait;
use autotest_wire::{SessionOpened, TestingConfig, ValidationSubmission};

use crate::error::SessionFault;

/// An open session with the testing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    /// Where every call of this session is sent.
    pub base_url: String,
    /// Bearer credential issued at session start.
    pub token: Option<String>,
    pub config: TestingConfig,
}

impl SessionHandle {
    /// Build a handle from the start-session reply; `default_base_url` is
    /// kept unless the service redirected the session elsewhere.
    pub fn from_opened(opened: SessionOpened, default_base_url: &str) -> Self {
        let base_url = opened
            .base_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| default_base_url.to_string());
        SessionHandle {
            session_id: opened.session_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: opened.token.filter(|t| !t.is_empty()),
            config: opened.config,
        }
    }
}

/// The logical endpoints of the testing service.
#[async_trait]
pub trait TestingService: Send + Sync {
    /// Open a session for run `run_id`.
    async fn open_session(&self, run_id: &str) -> Result<SessionHandle, SessionFault>;

    /// Close `session`.
    async fn close_session(&self, session: &SessionHandle) -> Result<(), SessionFault>;

    /// Whether `(service, operation)` is in scope for this run.
    async fn is_api_enabled(
        &self,
        session: &SessionHandle,
        service: &str,
        operation: &str,
    ) -> Result<bool, SessionFault>;

    /// The raw JSON corpus for `(service, operation)`.
    async fn get_requests(
        &self,
        session: &SessionHandle,
        service: &str,
        operation: &str,
    ) -> Result<Vec<u8>, SessionFault>;

    /// Submit one dispatch outcome; returns the mismatch message, empty on success.
    async fn validate_result(
        &self,
        session: &SessionHandle,
        submission: &ValidationSubmission,
    ) -> Result<String, SessionFault>;
}
