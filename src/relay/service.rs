//! The coordinator as a long-lived task.
//!
//! Callers, remotes and the host talk to the coordinator through a [`RelayHandle`], which
//! posts onto the service inbox. Each forward runs in its own task, so a slow remote never
//! holds up announcements or commands for other contexts. Once the service stops, every
//! handle reports the channel as invalidated.

use crate::error::TransportError;
use crate::relay::coordinator::RelayCoordinator;
use crate::transport::{LifecycleEvent, LifecycleSink, ReadinessAnnouncer, RelayLink};
use crate::types::{ContextId, Outcome, RelayRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const INVALIDATED: &str = "Extension context invalidated.";

/// Messages accepted by the relay service inbox.
#[derive(Debug)]
pub enum RelayMessage {
    Forward {
        request: RelayRequest,
        reply: oneshot::Sender<Outcome>,
    },
    Announce {
        context: ContextId,
        ack: oneshot::Sender<()>,
    },
    Lifecycle(LifecycleEvent),
}

pub struct RelayService;

impl RelayService {
    /// Start the service loop. The loop ends when every handle is dropped or the returned
    /// task is aborted.
    pub fn spawn(coordinator: Arc<RelayCoordinator>) -> (RelayHandle, JoinHandle<()>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(coordinator, inbox_rx));
        info!("Relay service started");
        (RelayHandle { inbox: inbox_tx }, task)
    }
}

async fn run(coordinator: Arc<RelayCoordinator>, mut inbox: mpsc::UnboundedReceiver<RelayMessage>) {
    while let Some(message) = inbox.recv().await {
        match message {
            RelayMessage::Forward { request, reply } => {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    let outcome = coordinator
                        .forward(request.target, &request.command)
                        .await
                        .unwrap_or_else(|err| {
                            debug!(action = %request.command.action, error = %err, "Forward failed");
                            Outcome::failure(&err)
                        });
                    if reply.send(outcome).is_err() {
                        debug!("Caller went away before the reply arrived");
                    }
                });
            }
            RelayMessage::Announce { context, ack } => {
                coordinator.announce_ready(context);
                let _ = ack.send(());
            }
            RelayMessage::Lifecycle(event) => coordinator.handle_lifecycle(event),
        }
    }
    info!("Relay service stopped");
}

/// Cloneable entry point into a running [`RelayService`].
#[derive(Debug, Clone)]
pub struct RelayHandle {
    inbox: mpsc::UnboundedSender<RelayMessage>,
}

impl RelayHandle {
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

#[async_trait]
impl RelayLink for RelayHandle {
    async fn dispatch(&self, request: RelayRequest) -> Result<Outcome, TransportError> {
        let (reply, receiver) = oneshot::channel();
        self.inbox
            .send(RelayMessage::Forward { request, reply })
            .map_err(|_| TransportError::new(INVALIDATED))?;
        receiver.await.map_err(|_| TransportError::new(INVALIDATED))
    }
}

#[async_trait]
impl ReadinessAnnouncer for RelayHandle {
    async fn announce_ready(&self, context: ContextId) -> Result<(), TransportError> {
        let (ack, receiver) = oneshot::channel();
        self.inbox
            .send(RelayMessage::Announce { context, ack })
            .map_err(|_| TransportError::new(INVALIDATED))?;
        receiver.await.map_err(|_| TransportError::new(INVALIDATED))
    }
}

impl LifecycleSink for RelayHandle {
    fn notify(&self, event: LifecycleEvent) {
        if self.inbox.send(RelayMessage::Lifecycle(event)).is_err() {
            warn!(context = %event.context(), "Relay service gone, lifecycle event dropped");
        }
    }
}
