//! Session bookkeeping and recorded submissions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use autotest_wire::ValidationSubmission;
use axum::http::{header, HeaderMap, StatusCode};
use tokio::sync::RwLock;

use crate::corpus::StubCorpus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Session {
    pub(crate) token: String,
    pub(crate) run_id: String,
    pub(crate) lang: String,
}

/// One validation call as the stub saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSubmission {
    pub session_id: String,
    pub submission: ValidationSubmission,
    /// The message the stub answered with; empty means accepted.
    pub message: String,
}

/// State shared by every handler.
pub struct StubState {
    pub(crate) corpus: StubCorpus,
    sessions: RwLock<HashMap<String, Session>>,
    next_session: AtomicU64,
    submissions: RwLock<Vec<RecordedSubmission>>,
    closed: RwLock<Vec<String>>,
}

impl StubState {
    pub fn new(corpus: StubCorpus) -> Self {
        StubState {
            corpus,
            sessions: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            submissions: RwLock::new(Vec::new()),
            closed: RwLock::new(Vec::new()),
        }
    }

    pub fn corpus(&self) -> &StubCorpus {
        &self.corpus
    }

    pub(crate) async fn open(&self, run_id: &str, lang: &str) -> (String, Session) {
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("session-{}", n);
        let session = Session {
            token: format!("stub-token-{}", n),
            run_id: run_id.to_string(),
            lang: lang.to_string(),
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());
        (session_id, session)
    }

    /// Check that `session_id` is open and `headers` carry its bearer token.
    pub(crate) async fn authorize(&self, session_id: &str, headers: &HeaderMap) -> Result<(), StatusCode> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id).ok_or(StatusCode::NOT_FOUND)?;
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented == Some(session.token.as_str()) {
            Ok(())
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }

    pub(crate) async fn close(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            self.closed.write().await.push(session_id.to_string());
        }
    }

    pub(crate) async fn record(&self, session_id: &str, submission: ValidationSubmission, message: String) {
        self.submissions.write().await.push(RecordedSubmission {
            session_id: session_id.to_string(),
            submission,
            message,
        });
    }

    /// Every submission received so far, in arrival order.
    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    /// Ids of sessions that were opened and not yet closed.
    pub async fn open_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of sessions closed through `endSession`, in order.
    pub async fn closed_sessions(&self) -> Vec<String> {
        self.closed.read().await.clone()
    }
}
