//! Session-scoped test controller.
//!
//! One [`TestController`] lives for the whole run. It owns the session with
//! the testing service, caches enablement answers and hands per-operation
//! tests the queries, client construction and validation they need.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use autotest_wire::{endpoints, TestingConfig, ValidationSubmission};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::context::OperationContext;
use crate::error::{ClientError, DispatchFault, HarnessError, SessionFault};
use crate::pagination::{self, ListResponses};
use crate::retry::{RetryAttachment, RetryPolicy};
use crate::sdk::{ConfigurationProvider, EnvConfigurationProvider, PaginatedRequest, PaginatedResponse};
use crate::service::http::HttpTestingService;
use crate::service::{SessionHandle, TestingService};
use crate::settings::HarnessSettings;

/// Lifecycle of the controller's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Running,
    /// The external service is switched off for this run.
    Disabled,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Running => "running",
            SessionPhase::Disabled => "disabled",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    handle: Option<SessionHandle>,
}

type EnabledKey = (String, String);

/// Process-wide state holder shared by every operation test.
pub struct TestController {
    service: Arc<dyn TestingService>,
    config_provider: Arc<dyn ConfigurationProvider>,
    settings: HarnessSettings,
    state: RwLock<SessionState>,
    enabled: RwLock<HashMap<EnabledKey, bool>>,
}

impl fmt::Debug for TestController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestController")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TestController {
    pub fn new(
        service: Arc<dyn TestingService>,
        config_provider: Arc<dyn ConfigurationProvider>,
        settings: HarnessSettings,
    ) -> Self {
        TestController {
            service,
            config_provider,
            settings,
            state: RwLock::new(SessionState {
                phase: SessionPhase::Uninitialized,
                handle: None,
            }),
            enabled: RwLock::new(HashMap::new()),
        }
    }

    /// A controller talking HTTP to `settings.service_url`, with credentials
    /// from the `OCI_*` environment variables.
    pub fn from_settings(settings: HarnessSettings) -> Self {
        let service = HttpTestingService::new(&settings.service_url);
        Self::new(
            Arc::new(service),
            Arc::new(EnvConfigurationProvider::default()),
            settings,
        )
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// The global with-retry flag.
    pub fn with_retry(&self) -> bool {
        self.settings.with_retry
    }

    /// The policy to attach to one request under `attachment`.
    pub fn retry_policy(&self, attachment: RetryAttachment) -> Option<Arc<RetryPolicy>> {
        attachment.policy(self.with_retry())
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    // ──────────────────────────────────────────────
    // Lifecycle
    // ──────────────────────────────────────────────

    /// Open the session. Allowed once, from [`SessionPhase::Uninitialized`].
    ///
    /// With the service disabled no call is made and the controller moves to
    /// [`SessionPhase::Disabled`].
    pub async fn start_session(&self) -> Result<(), SessionFault> {
        let mut state = self.state.write().await;
        if state.phase != SessionPhase::Uninitialized {
            return Err(SessionFault::InvalidState {
                action: "start the session",
                phase: state.phase,
            });
        }
        if self.settings.service_disabled {
            tracing::info!("testing service disabled, every operation will be skipped");
            state.phase = SessionPhase::Disabled;
            return Ok(());
        }

        let handle = self.service.open_session(&self.settings.run_id).await?;
        tracing::info!(
            session_id = %handle.session_id,
            base_url = %handle.base_url,
            region = %handle.config.region,
            run_id = %self.settings.run_id,
            "session started"
        );
        state.phase = SessionPhase::Running;
        state.handle = Some(handle);
        Ok(())
    }

    /// Close the session. Repeated calls after a successful close are no-ops.
    pub async fn end_session(&self) -> Result<(), SessionFault> {
        let mut state = self.state.write().await;
        match state.phase {
            SessionPhase::Closed | SessionPhase::Disabled => Ok(()),
            SessionPhase::Uninitialized => Err(SessionFault::InvalidState {
                action: "end the session",
                phase: state.phase,
            }),
            SessionPhase::Running => {
                if let Some(ref handle) = state.handle {
                    self.service.close_session(handle).await?;
                    tracing::info!(session_id = %handle.session_id, "session ended");
                }
                state.phase = SessionPhase::Closed;
                state.handle = None;
                self.enabled.write().await.clear();
                Ok(())
            }
        }
    }

    async fn session(&self, action: &'static str) -> Result<SessionHandle, SessionFault> {
        let state = self.state.read().await;
        match (state.phase, &state.handle) {
            (SessionPhase::Running, Some(handle)) => Ok(handle.clone()),
            (phase, _) => Err(SessionFault::InvalidState { action, phase }),
        }
    }

    /// The `TestingConfig` issued for this session.
    pub async fn testing_config(&self) -> Result<TestingConfig, SessionFault> {
        Ok(self.session("read the testing config").await?.config)
    }

    // ──────────────────────────────────────────────
    // Queries
    // ──────────────────────────────────────────────

    /// Whether `(service, operation)` is in scope. Always `false` when the
    /// service is disabled. Answers are cached for the session.
    pub async fn is_api_enabled(&self, service: &str, operation: &str) -> Result<bool, SessionFault> {
        if self.phase().await == SessionPhase::Disabled {
            return Ok(false);
        }
        let key = (service.to_string(), operation.to_string());
        if let Some(enabled) = self.enabled.read().await.get(&key) {
            return Ok(*enabled);
        }

        let session = self.session("query enablement").await?;
        let enabled = self
            .service
            .is_api_enabled(&session, service, operation)
            .await?;
        tracing::debug!(service, operation, enabled, "enablement answer");
        self.enabled.write().await.insert(key, enabled);
        Ok(enabled)
    }

    /// The raw corpus for `(service, operation)`.
    pub async fn get_requests(&self, service: &str, operation: &str) -> Result<Vec<u8>, SessionFault> {
        let session = self.session("fetch requests").await?;
        let body = self.service.get_requests(&session, service, operation).await?;
        tracing::debug!(service, operation, bytes = body.len(), "fetched request corpus");
        Ok(body)
    }

    /// Build the client for one operation through `factory`, handing it the
    /// session's credentials and testing config.
    pub async fn create_client_for_operation<C, F>(
        &self,
        service: &str,
        client_kind: &str,
        operation: &str,
        factory: F,
    ) -> Result<C, HarnessError>
    where
        F: FnOnce(&dyn ConfigurationProvider, &TestingConfig) -> Result<C, ClientError>,
    {
        let config = self.testing_config().await?;
        let client = factory(self.config_provider.as_ref(), &config)?;
        tracing::debug!(
            service,
            client_kind,
            operation,
            region = %config.region,
            endpoint = config.endpoint_override().unwrap_or(""),
            "created client"
        );
        Ok(client)
    }

    /// Submit one outcome. Returns the service's mismatch message; empty
    /// means the outcome was accepted.
    pub async fn validate_result<Req, Resp>(
        &self,
        container_id: &str,
        request: &Req,
        response: Option<&Resp>,
        fault: Option<&DispatchFault>,
    ) -> Result<String, SessionFault>
    where
        Req: Serialize + ?Sized,
        Resp: Serialize + ?Sized,
    {
        let session = self.session("validate a result").await?;
        let submission = ValidationSubmission {
            container_id: container_id.to_string(),
            request: encode(request)?,
            response: match response {
                Some(response) => encode(response)?,
                None => Value::Null,
            },
            error: fault.map(DispatchFault::to_record),
        };
        let message = self.service.validate_result(&session, &submission).await?;
        if message.is_empty() {
            tracing::debug!(container_id, "result accepted");
        } else {
            tracing::warn!(container_id, %message, "result rejected");
        }
        Ok(message)
    }

    /// Uniform entry point to the pagination driver.
    pub async fn generate_list_responses<R, P, F, Fut>(
        &self,
        request: &mut R,
        ctx: &OperationContext,
        dispatch: F,
    ) -> ListResponses<P>
    where
        R: PaginatedRequest,
        P: PaginatedResponse,
        F: FnMut(R) -> Fut,
        Fut: std::future::Future<Output = Result<P, DispatchFault>>,
    {
        pagination::generate_list_responses(request, ctx, dispatch).await
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, SessionFault> {
    serde_json::to_value(value).map_err(|e| SessionFault::Malformed {
        endpoint: endpoints::VALIDATE_RESULT.to_string(),
        message: format!("cannot encode submission: {}", e),
    })
}
