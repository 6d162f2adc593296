//! HTTP side of the stub: an `axum` router serving the testing-service
//! endpoints under [`SERVICE_PATH`].
//!
//! Endpoints:
//! - POST /SDKTestingService/startSession
//! - POST /SDKTestingService/endSession?sessionId=
//! - GET  /SDKTestingService/isApiEnabled?sessionId=&serviceName=&apiName=
//! - GET  /SDKTestingService/request?sessionId=&serviceName=&apiName=
//! - POST /SDKTestingService/response?sessionId=
//!
//! Every endpoint but `startSession` requires `Authorization: Bearer <token>`
//! with the token issued for the session.

mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use autotest_wire::endpoints;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use self::state::{RecordedSubmission, StubState};

use self::handlers::{
    handle_end_session, handle_get_requests, handle_is_api_enabled, handle_not_found,
    handle_start_session, handle_validate_result,
};
use crate::corpus::StubCorpus;

/// Path prefix of every endpoint.
pub const SERVICE_PATH: &str = "/SDKTestingService";

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// The stub's router over `state`.
pub fn router(state: Arc<StubState>) -> Router {
    let api = Router::new()
        .route(
            &format!("/{}", endpoints::START_SESSION),
            post(handle_start_session),
        )
        .route(
            &format!("/{}", endpoints::END_SESSION),
            post(handle_end_session),
        )
        .route(
            &format!("/{}", endpoints::IS_API_ENABLED),
            get(handle_is_api_enabled),
        )
        .route(
            &format!("/{}", endpoints::GET_REQUESTS),
            get(handle_get_requests),
        )
        .route(
            &format!("/{}", endpoints::VALIDATE_RESULT),
            post(handle_validate_result),
        );
    Router::new()
        .nest(SERVICE_PATH, api)
        .fallback(handle_not_found)
        .with_state(state)
}

/// A stub serving on a background task. Stops when dropped.
pub struct RunningStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl RunningStub {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The URL a harness should use as its service URL.
    pub fn service_url(&self) -> String {
        format!("http://{}{}", self.addr, SERVICE_PATH)
    }

    pub fn state(&self) -> &Arc<StubState> {
        &self.state
    }
}

impl Drop for RunningStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serve `corpus` on an ephemeral localhost port.
pub async fn spawn(corpus: StubCorpus) -> std::io::Result<RunningStub> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    let state = Arc::new(StubState::new(corpus));
    let app = router(state.clone());
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "stub service stopped");
        }
    });
    tracing::debug!(%addr, "stub service listening");
    Ok(RunningStub { addr, state, task })
}

/// Serve `corpus` on `port` until the process is stopped.
pub async fn serve(corpus: StubCorpus, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(
        port,
        operations = corpus.operations.len(),
        "stub testing service listening on http://0.0.0.0:{}{}",
        port,
        SERVICE_PATH
    );
    let app = router(Arc::new(StubState::new(corpus)));
    axum::serve(listener, app).await
}
