//! Channel seams between the three contexts.
//!
//! Caller → coordinator goes through a [`RelayLink`]; coordinator → remote goes through a
//! [`Transport`]; remote → coordinator readiness announcements go through a
//! [`ReadinessAnnouncer`]; host → coordinator teardown notices go through a
//! [`LifecycleSink`]. Each send yields at most one reply.

use crate::error::TransportError;
use crate::types::{Command, ContextId, Outcome, RelayRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Coordinator's channel to remote contexts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `command` to `context` and wait for its single reply.
    async fn send(&self, context: ContextId, command: &Command) -> Result<Outcome, TransportError>;
}

/// Caller's channel to the coordinator.
#[async_trait]
pub trait RelayLink: Send + Sync {
    async fn dispatch(&self, request: RelayRequest) -> Result<Outcome, TransportError>;
}

/// Remote context's channel for its one-time "I am ready" announcement.
#[async_trait]
pub trait ReadinessAnnouncer: Send + Sync {
    async fn announce_ready(&self, context: ContextId) -> Result<(), TransportError>;
}

/// Host-side notices about remote context churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "context", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The context began loading a new document (navigation or reload).
    Navigated(ContextId),
    /// The context was torn down for good.
    Removed(ContextId),
}

impl LifecycleEvent {
    pub fn context(self) -> ContextId {
        match self {
            LifecycleEvent::Navigated(id) | LifecycleEvent::Removed(id) => id,
        }
    }
}

pub trait LifecycleSink: Send + Sync {
    fn notify(&self, event: LifecycleEvent);
}
