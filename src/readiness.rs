//! Readiness Tracker
//!
//! Best-effort cache of remote contexts that have affirmatively confirmed readiness,
//! either by announcing themselves or by answering a liveness probe with `ready = true`.
//! Presence is not proof of liveness: a context can navigate away without telling anyone.

use crate::types::ContextId;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;

/// Set of context ids known to be alive and initialized.
///
/// Owned by the relay coordinator; nothing else mutates it.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    ready: RwLock<HashSet<ContextId>>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `context` confirmed readiness. Idempotent.
    ///
    /// Returns `true` if the context was not already marked ready.
    pub fn mark_ready(&self, context: ContextId) -> bool {
        let inserted = self.ready.write().insert(context);
        if inserted {
            debug!(context = %context, "Context marked ready");
        }
        inserted
    }

    /// Drop any record for `context`. Forgetting an absent id is a no-op.
    ///
    /// Returns `true` if a record was removed.
    pub fn forget(&self, context: ContextId) -> bool {
        let removed = self.ready.write().remove(&context);
        if removed {
            debug!(context = %context, "Context readiness forgotten");
        }
        removed
    }

    pub fn is_ready(&self, context: ContextId) -> bool {
        self.ready.read().contains(&context)
    }

    pub fn len(&self) -> usize {
        self.ready.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.read().is_empty()
    }

    /// Sorted snapshot of ready ids.
    pub fn snapshot(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.ready.read().iter().copied().collect();
        ids.sort();
        ids
    }
}
