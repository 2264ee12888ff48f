//! Relay Coordinator
//!
//! The only component holding channels to both sides. It owns the [`ReadinessTracker`]
//! and forwards caller commands to remote contexts: an optimistic send first, then on a
//! recoverable failure a bounded liveness probe and exactly one resend.

use crate::backoff::Backoff;
use crate::config::ProbeConfig;
use crate::error::{ErrorKind, RelayError};
use crate::readiness::ReadinessTracker;
use crate::transport::{LifecycleEvent, Transport};
use crate::types::{Command, ContextId, Outcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RelayCoordinator {
    tracker: ReadinessTracker,
    transport: Arc<dyn Transport>,
    probe: Backoff,
}

impl RelayCoordinator {
    pub fn new(transport: Arc<dyn Transport>, probe: &ProbeConfig) -> Self {
        Self {
            tracker: ReadinessTracker::new(),
            transport,
            probe: probe.backoff(),
        }
    }

    pub fn tracker(&self) -> &ReadinessTracker {
        &self.tracker
    }

    /// Record a remote's startup announcement. Idempotent.
    pub fn announce_ready(&self, context: ContextId) {
        if self.tracker.mark_ready(context) {
            info!(context = %context, "Remote context announced ready");
        }
    }

    /// Drop the readiness record for a destroyed context. Idempotent.
    pub fn forget(&self, context: ContextId) {
        self.tracker.forget(context);
    }

    pub fn handle_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Removed(context) => {
                debug!(context = %context, "Context removed");
                self.forget(context);
            }
            LifecycleEvent::Navigated(context) => {
                // The id survives navigation but the instance behind it does not.
                debug!(context = %context, "Context navigated");
                self.forget(context);
            }
        }
    }

    /// Forward `command` to `target` and return the remote's reply verbatim.
    pub async fn forward(
        &self,
        target: Option<ContextId>,
        command: &Command,
    ) -> Result<Outcome, RelayError> {
        let Some(context) = target else {
            warn!(action = %command.action, "No target context for command");
            return Err(RelayError::NoTarget);
        };

        let err = match self.transport.send(context, command).await {
            Ok(reply) => return Ok(reply),
            Err(err) => err,
        };

        match err.kind() {
            ErrorKind::ChannelInvalidated => return Err(RelayError::ChannelInvalidated),
            ErrorKind::Unreachable => {
                warn!(context = %context, error = %err, "Context unreachable");
                self.tracker.forget(context);
                return Err(RelayError::from_transport(context, &err));
            }
            _ => {}
        }

        debug!(
            context = %context,
            action = %command.action,
            error = %err,
            "Direct send failed, probing liveness"
        );
        self.tracker.forget(context);

        if !self.probe_until_ready(context).await? {
            warn!(context = %context, probes = self.probe.attempts(), "Context never confirmed readiness");
            return Err(RelayError::NotReady { context });
        }

        self.transport
            .send(context, command)
            .await
            .map_err(|err| RelayError::from_transport(context, &err))
    }

    /// Probe until the context confirms readiness or the probe budget runs out.
    ///
    /// `Ok(false)` means "still not ready"; an error means the context is gone.
    async fn probe_until_ready(&self, context: ContextId) -> Result<bool, RelayError> {
        let ping = Command::ping();
        for attempt in 0..self.probe.attempts() {
            self.probe.wait(attempt).await;

            // An announcement may land while we are probing.
            if self.tracker.is_ready(context) {
                return Ok(true);
            }

            match self.transport.send(context, &ping).await {
                Ok(reply) if reply.ready_flag() == Some(true) => {
                    self.tracker.mark_ready(context);
                    debug!(context = %context, attempt, "Probe confirmed readiness");
                    return Ok(true);
                }
                Ok(_) => {
                    debug!(context = %context, attempt, "Probe answered not ready");
                }
                Err(err) => match err.kind() {
                    ErrorKind::Unreachable | ErrorKind::ChannelInvalidated => {
                        return Err(RelayError::from_transport(context, &err));
                    }
                    _ => debug!(context = %context, attempt, error = %err, "Probe failed"),
                },
            }
        }
        Ok(false)
    }
}
