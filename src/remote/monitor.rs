//! Storage-change monitor: a bounded log of page storage mutations.

use crate::script::realm::{PageRealm, StorageChange};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Oldest entries are dropped once `capacity` is reached.
#[derive(Debug)]
pub struct StorageChangeLog {
    entries: Mutex<VecDeque<StorageChange>>,
    capacity: usize,
}

impl Default for StorageChangeLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_CAPACITY)
    }
}

impl StorageChangeLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CHANGE_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, change: StorageChange) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(change);
    }

    /// Remove and return everything recorded so far, oldest first.
    pub fn drain(&self) -> Vec<StorageChange> {
        self.entries.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Hook the page's storage events into `log`. `None` if the page cannot be instrumented.
pub async fn install(realm: &dyn PageRealm, log: Arc<StorageChangeLog>) -> Option<JoinHandle<()>> {
    let mut changes = realm.watch_storage().await?;
    Some(tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            debug!(area = ?change.area, key = ?change.key, "Storage change observed");
            log.record(change);
        }
    }))
}
