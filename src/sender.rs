//! Retrying Sender
//!
//! Caller-side entry point. Absorbs "remote not ready yet" with a short linear backoff and
//! stops at the first reply that is either a success or a failure not worth waiting out.

use crate::backoff::Backoff;
use crate::config::RetryConfig;
use crate::error::{ErrorKind, RelayError, TransportError};
use crate::transport::RelayLink;
use crate::types::{Command, ContextId, ExecutionOutcome, Outcome, RelayRequest, ACTION_EXECUTE_SCRIPT};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub struct RetryingSender<L> {
    link: L,
    backoff: Backoff,
}

impl<L: RelayLink> RetryingSender<L> {
    pub fn new(link: L, config: &RetryConfig) -> Self {
        Self {
            link,
            backoff: config.backoff(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Default retry budget.
    pub fn max_retries(&self) -> u32 {
        self.backoff.max_retries
    }

    /// Send `action` with `payload` to `target`.
    ///
    /// Makes at most `max_retries + 1` attempts (default budget when `None`). Exhausting
    /// the budget returns the last reply, not a synthesized error.
    pub async fn send(
        &self,
        target: Option<ContextId>,
        action: &str,
        payload: Value,
        max_retries: Option<u32>,
    ) -> Outcome {
        let backoff = Backoff::new(
            max_retries.unwrap_or(self.backoff.max_retries),
            self.backoff.base_delay_ms,
        );
        let request = RelayRequest::new(target, Command::new(action, payload));

        let mut last = None;
        for attempt in 0..backoff.attempts() {
            if attempt > 0 {
                debug!(
                    action,
                    attempt,
                    delay_ms = backoff.delay_before(attempt).as_millis() as u64,
                    "Retrying after not-ready reply"
                );
                backoff.wait(attempt).await;
            }

            let outcome = match self.link.dispatch(request.clone()).await {
                Ok(outcome) => outcome,
                Err(err) => link_failure(&err),
            };
            if outcome.success {
                return outcome;
            }

            let kind = outcome.error_kind().unwrap_or(ErrorKind::Other);
            if !kind.is_retryable() {
                debug!(action, attempt, kind = ?kind, "Terminal failure, not retrying");
                return outcome;
            }
            last = Some(outcome);
        }

        warn!(action, attempts = backoff.attempts(), "Retry budget exhausted");
        last.unwrap_or_else(|| Outcome::failure(&RelayError::NoTarget))
    }

    /// Run `source` in the target page and return its canonical result.
    pub async fn run_script(&self, target: Option<ContextId>, source: &str) -> ExecutionOutcome {
        self.send(target, ACTION_EXECUTE_SCRIPT, json!({ "code": source }), None)
            .await
            .into()
    }
}

/// The caller-to-coordinator channel itself failed.
fn link_failure(err: &TransportError) -> Outcome {
    match err.kind() {
        ErrorKind::ChannelInvalidated => Outcome::failure(&RelayError::ChannelInvalidated),
        kind => Outcome {
            success: false,
            result: None,
            error: Some(err.message.clone()),
            kind: Some(kind),
        },
    }
}
