//! Per-operation cancellation.

use std::future::Future;

use tokio::sync::watch;

use crate::error::DispatchFault;

/// Cancellation signal handed from the runner to one operation test and
/// every dispatch it makes.
#[derive(Debug, Clone)]
pub struct OperationContext {
    cancel: Option<watch::Receiver<bool>>,
}

/// The runner's side of an [`OperationContext`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the paired context. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl OperationContext {
    /// A context cancelled through the returned handle.
    pub fn new() -> (CancelHandle, OperationContext) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, OperationContext { cancel: Some(rx) })
    }

    /// A context that is never cancelled.
    pub fn detached() -> OperationContext {
        OperationContext { cancel: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the context is cancelled; never resolves otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.cancel else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Handle dropped without cancelling.
            std::future::pending::<()>().await;
        }
    }

    /// Run one dispatch, abandoning it with [`DispatchFault::Cancelled`] as
    /// soon as the context is cancelled.
    pub async fn guard<T, F>(&self, dispatch: F) -> Result<T, DispatchFault>
    where
        F: Future<Output = Result<T, DispatchFault>>,
    {
        if self.is_cancelled() {
            return Err(DispatchFault::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DispatchFault::Cancelled),
            outcome = dispatch => outcome,
        }
    }
}
