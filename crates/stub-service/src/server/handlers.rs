//! Route handlers, one per testing-service endpoint.

use std::sync::Arc;

use autotest_wire::{
    EnabledAnswer, OperationQuery, SessionOpenRequest, SessionOpened, SessionQuery,
    ValidationSubmission, ValidationVerdict,
};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::json_error;
use super::state::StubState;

fn rejected(status: StatusCode, session_id: &str) -> Response {
    let message = if status == StatusCode::NOT_FOUND {
        format!("unknown session '{}'", session_id)
    } else {
        "missing or invalid bearer token".to_string()
    };
    tracing::warn!(session_id, status = status.as_u16(), "request rejected");
    json_error(status, &message).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// POST /startSession
pub(crate) async fn handle_start_session(
    State(state): State<Arc<StubState>>,
    Json(body): Json<SessionOpenRequest>,
) -> Response {
    let (session_id, session) = state.open(&body.run_id, &body.lang).await;
    tracing::info!(
        session_id = %session_id,
        run_id = %session.run_id,
        lang = %session.lang,
        "session opened"
    );
    let reply = SessionOpened {
        session_id,
        base_url: None,
        token: Some(session.token),
        config: state.corpus.config.clone(),
    };
    (StatusCode::OK, Json(reply)).into_response()
}

/// POST /endSession?sessionId=
pub(crate) async fn handle_end_session(
    State(state): State<Arc<StubState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(status) = state.authorize(&query.session_id, &headers).await {
        return rejected(status, &query.session_id);
    }
    state.close(&query.session_id).await;
    tracing::info!(session_id = %query.session_id, "session closed");
    (StatusCode::OK, Json(serde_json::json!({}))).into_response()
}

/// GET /isApiEnabled?sessionId=&serviceName=&apiName=
pub(crate) async fn handle_is_api_enabled(
    State(state): State<Arc<StubState>>,
    Query(query): Query<OperationQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(status) = state.authorize(&query.session_id, &headers).await {
        return rejected(status, &query.session_id);
    }
    let enabled = state
        .corpus
        .is_enabled(&query.service_name, &query.api_name);
    (StatusCode::OK, Json(EnabledAnswer { enabled })).into_response()
}

/// GET /request?sessionId=&serviceName=&apiName=
pub(crate) async fn handle_get_requests(
    State(state): State<Arc<StubState>>,
    Query(query): Query<OperationQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(status) = state.authorize(&query.session_id, &headers).await {
        return rejected(status, &query.session_id);
    }
    let records = state.corpus.requests(&query.service_name, &query.api_name);
    tracing::debug!(
        service = %query.service_name,
        operation = %query.api_name,
        records = records.len(),
        "serving requests"
    );
    (StatusCode::OK, Json(records)).into_response()
}

/// POST /response?sessionId=
pub(crate) async fn handle_validate_result(
    State(state): State<Arc<StubState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(submission): Json<ValidationSubmission>,
) -> Response {
    if let Err(status) = state.authorize(&query.session_id, &headers).await {
        return rejected(status, &query.session_id);
    }
    let message = state.corpus.check(&submission);
    tracing::debug!(
        container_id = %submission.container_id,
        accepted = message.is_empty(),
        "validated submission"
    );
    state
        .record(&query.session_id, submission, message.clone())
        .await;
    (StatusCode::OK, Json(ValidationVerdict { message })).into_response()
}
