//! Remote Readiness Responder
//!
//! Runs inside a remote context. Two states, uninitialized and ready, with a single
//! transition made by [`RemoteResponder::start`] after the storage monitor is installed.
//! Pings are answered in both states; everything else needs the ready state.

use crate::config::InjectionConfig;
use crate::error::RelayError;
use crate::pending::PendingSlot;
use crate::remote::handlers::{ActionHandler, HandlerRegistry};
use crate::remote::monitor::{self, StorageChangeLog};
use crate::script::realm::PageRealm;
use crate::script::runner::ScriptRunner;
use crate::transport::ReadinessAnnouncer;
use crate::types::{Command, ContextId, Outcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct RemoteResponder {
    context: ContextId,
    realm: Arc<dyn PageRealm>,
    runner: Arc<ScriptRunner>,
    handlers: HandlerRegistry,
    changes: Arc<StorageChangeLog>,
    pending: Option<PendingSlot>,
    started: AtomicBool,
    ready: AtomicBool,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteResponder {
    pub fn new(context: ContextId, realm: Arc<dyn PageRealm>, injection: &InjectionConfig) -> Self {
        let runner = Arc::new(ScriptRunner::new(injection));
        let changes = Arc::new(StorageChangeLog::default());
        let handlers =
            HandlerRegistry::builtin(Arc::clone(&realm), Arc::clone(&runner), Arc::clone(&changes));
        Self {
            context,
            realm,
            runner,
            handlers,
            changes,
            pending: None,
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            monitor: Mutex::new(None),
        }
    }

    /// Run the slot's script (if any, and fresh) once at startup.
    pub fn with_pending(mut self, pending: PendingSlot) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn with_handler(mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.register(action, handler);
        self
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn storage_changes(&self) -> &StorageChangeLog {
        &self.changes
    }

    /// Answer one command. Always produces a well-formed reply.
    pub async fn handle(&self, command: &Command) -> Outcome {
        if command.is_ping() {
            return Outcome::readiness(self.is_ready());
        }
        if !self.is_ready() {
            debug!(context = %self.context, action = %command.action, "Command before ready");
            return Outcome::failure(&RelayError::NotReady {
                context: self.context,
            });
        }
        let Some(handler) = self.handlers.get(&command.action) else {
            warn!(context = %self.context, action = %command.action, "Unknown action");
            return Outcome::failure(&RelayError::UnknownAction(command.action.clone()));
        };
        handler.handle(&command.payload).await.into()
    }

    /// Install instrumentation, become ready, announce, then run any pending script.
    ///
    /// Only the first call does anything.
    pub async fn start(&self, announcer: &dyn ReadinessAnnouncer) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        match monitor::install(self.realm.as_ref(), Arc::clone(&self.changes)).await {
            Some(task) => *self.monitor.lock() = Some(task),
            None => debug!(context = %self.context, "Page storage cannot be monitored"),
        }

        self.ready.store(true, Ordering::Release);
        info!(context = %self.context, "Remote context ready");

        if let Err(err) = announcer.announce_ready(self.context).await {
            warn!(context = %self.context, error = %err, "Readiness announcement failed");
        }

        self.run_pending().await;
    }

    async fn run_pending(&self) {
        let Some(pending) = &self.pending else {
            return;
        };
        let script = match pending.take_fresh() {
            Ok(Some(script)) => script,
            Ok(None) => return,
            Err(err) => {
                warn!(context = %self.context, error = %err, "Pending script unavailable");
                return;
            }
        };
        info!(context = %self.context, "Running pending script");
        match self.runner.run(self.realm.as_ref(), &script.source).await {
            Ok(result) => info!(context = %self.context, result = %result, "Pending script finished"),
            Err(err) => warn!(context = %self.context, error = %err, "Pending script failed"),
        }
    }
}

impl Drop for RemoteResponder {
    fn drop(&mut self) {
        if let Some(task) = self.monitor.get_mut().take() {
            task.abort();
        }
    }
}
