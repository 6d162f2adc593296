//! Retry policy provider.
//!
//! The engine never retries on its own. It attaches a [`RetryPolicy`] to a
//! request's metadata slot and the SDK transport consults it after a failed
//! attempt.

use std::sync::Arc;
use std::time::Duration;

use crate::sdk::OciRequest;

/// Status codes the test policy treats as transient.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// What the transport observed for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The call completed with this HTTP status.
    Completed { status: u16 },
    /// No HTTP status was received (connection reset, timeout, ...).
    Transport,
}

/// A plain-value retry policy. Safe to share between concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl RetryPolicy {
    /// Whether the transport should try again after attempt number `attempt`
    /// (1-based) ended with `outcome`.
    pub fn should_retry(&self, attempt: u32, outcome: &AttemptOutcome) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match outcome {
            AttemptOutcome::Completed { status } => self.retryable_statuses.contains(status),
            AttemptOutcome::Transport => true,
        }
    }

    /// Delay before the attempt following `attempt` (1-based): doubles from
    /// `initial_backoff`, capped at `max_backoff`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }
}

/// A fresh policy for one request's attempt cycle.
///
/// Each call returns a new allocation so records never share a slot.
pub fn retry_policy_for_tests() -> Arc<RetryPolicy> {
    Arc::new(RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(30),
        retryable_statuses: RETRYABLE_STATUSES.to_vec(),
    })
}

/// How an operation decides whether its requests carry a retry policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryAttachment {
    /// Attach only when the global with-retry flag is set.
    #[default]
    WhenEnabled,
    /// Attach regardless of the global flag.
    Always,
    /// Never attach; the SDK default (no retries) applies.
    Never,
}

impl RetryAttachment {
    /// The policy to attach for one record, if any.
    pub fn policy(self, with_retry: bool) -> Option<Arc<RetryPolicy>> {
        match self {
            RetryAttachment::Always => Some(retry_policy_for_tests()),
            RetryAttachment::WhenEnabled if with_retry => Some(retry_policy_for_tests()),
            RetryAttachment::WhenEnabled | RetryAttachment::Never => None,
        }
    }
}

/// Place `policy` in the request's metadata slot, replacing whatever was
/// there. Attaching the same policy twice leaves the same state.
pub fn attach_retry_policy<R: OciRequest>(request: &mut R, policy: Option<Arc<RetryPolicy>>) {
    request.request_metadata_mut().retry_policy = policy;
}
