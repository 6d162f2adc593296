//! HTTP testing-service client.
//!
//! Uses `ureq` (sync) inside `tokio::task::spawn_blocking` so a slow
//! service never stalls the runtime that drives the operation tests.

use async_trait::async_trait;
use autotest_wire::{
    endpoints, EnabledAnswer, SessionOpenRequest, SessionOpened, ValidationSubmission,
    ValidationVerdict, HARNESS_LANG,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{SessionHandle, TestingService};
use crate::error::SessionFault;

/// [`TestingService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTestingService {
    service_url: String,
    agent: ureq::Agent,
}

impl HttpTestingService {
    /// A client for the service at `service_url`
    /// (e.g. `http://localhost:8090/SDKTestingService`).
    pub fn new(service_url: &str) -> Self {
        HttpTestingService {
            service_url: service_url.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

/// One HTTP exchange, fully owned so it can move onto the blocking pool.
#[derive(Debug, Clone)]
struct Call {
    method: Method,
    endpoint: &'static str,
    base_url: String,
    query: Vec<(&'static str, String)>,
    token: Option<String>,
    body: Option<Value>,
}

impl Call {
    fn new(method: Method, endpoint: &'static str, base_url: &str) -> Self {
        Call {
            method,
            endpoint,
            base_url: base_url.to_string(),
            query: Vec::new(),
            token: None,
            body: None,
        }
    }

    /// A call within `session`: session id in the query, bearer token attached.
    fn in_session(method: Method, endpoint: &'static str, session: &SessionHandle) -> Self {
        let mut call = Call::new(method, endpoint, &session.base_url);
        call.token = session.token.clone();
        call.query.push(("sessionId", session.session_id.clone()));
        call
    }

    fn operation(mut self, service: &str, operation: &str) -> Self {
        self.query.push(("serviceName", service.to_string()));
        self.query.push(("apiName", operation.to_string()));
        self
    }

    fn json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.endpoint)
    }

    fn decorate<B>(&self, mut request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (key, value) in &self.query {
            request = request.query(*key, value);
        }
        if let Some(ref token) = self.token {
            request = request.header("Authorization", &format!("Bearer {}", token));
        }
        request
    }

    fn send(&self, agent: &ureq::Agent) -> Result<ureq::Body, SessionFault> {
        let url = self.url();
        let result = match (self.method, &self.body) {
            (Method::Get, _) => self.decorate(agent.get(&url)).call(),
            (Method::Post, Some(body)) => self.decorate(agent.post(&url)).send_json(body),
            (Method::Post, None) => self.decorate(agent.post(&url)).send_empty(),
        };
        result
            .map(|response| response.into_body())
            .map_err(|e| classify_error(self.endpoint, e))
    }

    fn send_for_json<T: DeserializeOwned>(&self, agent: &ureq::Agent) -> Result<T, SessionFault> {
        self.send(agent)?
            .read_json::<T>()
            .map_err(|e| SessionFault::Malformed {
                endpoint: self.endpoint.to_string(),
                message: e.to_string(),
            })
    }

    fn send_for_bytes(&self, agent: &ureq::Agent) -> Result<Vec<u8>, SessionFault> {
        self.send(agent)?
            .read_to_vec()
            .map_err(|e| SessionFault::Transport {
                endpoint: self.endpoint.to_string(),
                message: format!("error reading reply: {}", e),
            })
    }
}

fn classify_error(endpoint: &str, err: ureq::Error) -> SessionFault {
    match err {
        ureq::Error::StatusCode(status) => SessionFault::Status {
            endpoint: endpoint.to_string(),
            status,
        },
        other => SessionFault::Transport {
            endpoint: endpoint.to_string(),
            message: other.to_string(),
        },
    }
}

/// Run `f` on the blocking pool.
async fn blocking<T, F>(endpoint: &'static str, f: F) -> Result<T, SessionFault>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SessionFault> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SessionFault::Join(format!("{}: {}", endpoint, e)))?
}

fn to_json<T: serde::Serialize>(endpoint: &'static str, value: &T) -> Result<Value, SessionFault> {
    serde_json::to_value(value).map_err(|e| SessionFault::Malformed {
        endpoint: endpoint.to_string(),
        message: format!("cannot encode request body: {}", e),
    })
}

#[async_trait]
impl TestingService for HttpTestingService {
    async fn open_session(&self, run_id: &str) -> Result<SessionHandle, SessionFault> {
        let body = to_json(
            endpoints::START_SESSION,
            &SessionOpenRequest {
                run_id: run_id.to_string(),
                lang: HARNESS_LANG.to_string(),
            },
        )?;
        let call = Call::new(Method::Post, endpoints::START_SESSION, &self.service_url).json_body(body);
        let agent = self.agent.clone();
        let opened: SessionOpened =
            blocking(endpoints::START_SESSION, move || call.send_for_json(&agent)).await?;
        Ok(SessionHandle::from_opened(opened, &self.service_url))
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<(), SessionFault> {
        let call = Call::in_session(Method::Post, endpoints::END_SESSION, session);
        let agent = self.agent.clone();
        blocking(endpoints::END_SESSION, move || call.send(&agent).map(|_| ())).await
    }

    async fn is_api_enabled(
        &self,
        session: &SessionHandle,
        service: &str,
        operation: &str,
    ) -> Result<bool, SessionFault> {
        let call = Call::in_session(Method::Get, endpoints::IS_API_ENABLED, session)
            .operation(service, operation);
        let agent = self.agent.clone();
        let answer: EnabledAnswer =
            blocking(endpoints::IS_API_ENABLED, move || call.send_for_json(&agent)).await?;
        Ok(answer.enabled)
    }

    async fn get_requests(
        &self,
        session: &SessionHandle,
        service: &str,
        operation: &str,
    ) -> Result<Vec<u8>, SessionFault> {
        let call = Call::in_session(Method::Get, endpoints::GET_REQUESTS, session)
            .operation(service, operation);
        let agent = self.agent.clone();
        blocking(endpoints::GET_REQUESTS, move || call.send_for_bytes(&agent)).await
    }

    async fn validate_result(
        &self,
        session: &SessionHandle,
        submission: &ValidationSubmission,
    ) -> Result<String, SessionFault> {
        let body = to_json(endpoints::VALIDATE_RESULT, submission)?;
        let call =
            Call::in_session(Method::Post, endpoints::VALIDATE_RESULT, session).json_body(body);
        let agent = self.agent.clone();
        let verdict: ValidationVerdict =
            blocking(endpoints::VALIDATE_RESULT, move || call.send_for_json(&agent)).await?;
        Ok(verdict.message)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use autotest_wire::TestingConfig;

    fn session() -> SessionHandle {
        SessionHandle {
            session_id: "s-9".into(),
            base_url: "http://localhost:8090/svc".into(),
            token: Some("tok".into()),
            config: TestingConfig::default(),
        }
    }

    #[test]
    fn service_url_is_trimmed() {
        let service = HttpTestingService::new("http://localhost:8090/SDKTestingService/");
        assert_eq!(service.service_url(), "http://localhost:8090/SDKTestingService");
    }

    #[test]
    fn session_call_carries_id_and_token() {
        let call = Call::in_session(Method::Get, endpoints::IS_API_ENABLED, &session())
            .operation("limits", "ListServices");
        assert_eq!(call.url(), "http://localhost:8090/svc/isApiEnabled");
        assert_eq!(call.token.as_deref(), Some("tok"));
        assert_eq!(
            call.query,
            vec![
                ("sessionId", "s-9".to_string()),
                ("serviceName", "limits".to_string()),
                ("apiName", "ListServices".to_string()),
            ]
        );
    }

    #[test]
    fn status_errors_are_classified() {
        match classify_error("request", ureq::Error::StatusCode(503)) {
            SessionFault::Status { endpoint, status } => {
                assert_eq!(endpoint, "request");
                assert_eq!(status, 503);
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_fault() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let service = HttpTestingService::new("http://127.0.0.1:9/svc");
        let err = service.open_session("run").await.unwrap_err();
        assert!(matches!(err, SessionFault::Transport { .. }), "{err:?}");
    }
}
