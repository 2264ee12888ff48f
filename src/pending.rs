//! Pending script slot.
//!
//! A script stashed for the next page load. The remote responder takes it once at
//! startup, after announcing readiness, and runs it. The slot is cleared by the take,
//! so a script runs at most once even if it fails.

use crate::config::PendingConfig;
use crate::error::RelayError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingScript {
    pub source: String,
    pub stashed_at: DateTime<Utc>,
}

impl PendingScript {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stashed_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(self.stashed_at) > max_age,
            Err(_) => false,
        }
    }
}

/// Storage for at most one pending script.
pub trait PendingScriptStore: Send + Sync {
    /// Replace whatever is stashed with `script`.
    fn put(&self, script: PendingScript) -> Result<(), RelayError>;

    /// Remove and return the stashed script.
    fn take(&self) -> Result<Option<PendingScript>, RelayError>;

    fn stash(&self, source: &str) -> Result<PendingScript, RelayError> {
        let script = PendingScript::new(source);
        self.put(script.clone())?;
        Ok(script)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPendingScriptStore {
    slot: Mutex<Option<PendingScript>>,
}

impl MemoryPendingScriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingScriptStore for MemoryPendingScriptStore {
    fn put(&self, script: PendingScript) -> Result<(), RelayError> {
        *self.slot.lock() = Some(script);
        Ok(())
    }

    fn take(&self) -> Result<Option<PendingScript>, RelayError> {
        Ok(self.slot.lock().take())
    }
}

/// JSON file holding the slot; an absent file is an empty slot.
#[derive(Debug)]
pub struct FilePendingScriptStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePendingScriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingScriptStore for FilePendingScriptStore {
    fn put(&self, script: PendingScript) -> Result<(), RelayError> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RelayError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(&script)
            .map_err(|e| RelayError::Storage(format!("Failed to encode pending script: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            RelayError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    fn take(&self) -> Result<Option<PendingScript>, RelayError> {
        let _guard = self.lock.lock();
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            RelayError::Storage(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        // Cleared before parsing so a corrupt slot is not retried on every load.
        fs::remove_file(&self.path).map_err(|e| {
            RelayError::Storage(format!("Failed to clear {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| RelayError::Storage(format!("Corrupt pending script slot: {}", e)))
    }
}

/// A store plus the age limit applied when taking from it.
#[derive(Clone)]
pub struct PendingSlot {
    store: Arc<dyn PendingScriptStore>,
    max_age: Duration,
}

impl PendingSlot {
    pub fn new(store: Arc<dyn PendingScriptStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// Memory- or file-backed slot, per configuration.
    pub fn from_config(config: &PendingConfig) -> Self {
        let store: Arc<dyn PendingScriptStore> = match &config.path {
            Some(path) => Arc::new(FilePendingScriptStore::new(path)),
            None => Arc::new(MemoryPendingScriptStore::new()),
        };
        Self::new(store, Duration::from_secs(config.max_age_secs))
    }

    pub fn stash(&self, source: &str) -> Result<PendingScript, RelayError> {
        let script = self.store.stash(source)?;
        debug!(len = source.len(), "Pending script stashed");
        Ok(script)
    }

    /// Take the stashed script if it is still fresh. Stale scripts are cleared and dropped.
    pub fn take_fresh(&self) -> Result<Option<PendingScript>, RelayError> {
        let Some(script) = self.store.take()? else {
            return Ok(None);
        };
        if script.is_expired(self.max_age, Utc::now()) {
            info!(stashed_at = %script.stashed_at, "Discarding stale pending script");
            return Ok(None);
        }
        Ok(Some(script))
    }
}

impl std::fmt::Debug for PendingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSlot")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}
