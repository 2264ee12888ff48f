//! Page script engine.
//!
//! A boa [`Context`] is not `Send`, so every page gets a dedicated thread that owns its
//! context and evaluates jobs in arrival order, the way a page's main thread would.

use crate::script::realm::StorageChange;
use boa_engine::vm::RuntimeLimits;
use boa_engine::{Context, Source};
use std::sync::mpsc;
use thiserror::Error;
use tokio::sync::mpsc as async_mpsc;
use tracing::{debug, warn};

/// Iterations any single loop may run before the engine abandons the script.
pub const LOOP_ITERATION_LIMIT: u64 = 50_000;
const RECURSION_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The evaluated source let an exception or a runtime limit escape.
    #[error("{0}")]
    Uncaught(String),
    #[error("page engine stopped")]
    Stopped,
}

enum EngineJob {
    Eval {
        source: String,
        reply: mpsc::Sender<Result<String, String>>,
    },
    Watch(async_mpsc::UnboundedSender<StorageChange>),
}

/// Handle to a page's engine thread. The thread exits once every handle is dropped.
#[derive(Clone)]
pub struct PageEngine {
    jobs: mpsc::Sender<EngineJob>,
}

impl PageEngine {
    /// Start the engine thread and evaluate `bootstrap` before any job.
    pub fn spawn(bootstrap: String) -> Self {
        let (jobs, inbox) = mpsc::channel();
        std::thread::spawn(move || run_engine(&bootstrap, inbox));
        Self { jobs }
    }

    /// Evaluate `source` as a classic script and return its completion value as a string.
    pub async fn eval(&self, source: String) -> Result<String, EngineError> {
        let jobs = self.jobs.clone();
        // Waiting from the blocking pool holds a paused clock still while the script runs.
        tokio::task::spawn_blocking(move || {
            let (reply, response) = mpsc::channel();
            jobs.send(EngineJob::Eval { source, reply })
                .map_err(|_| EngineError::Stopped)?;
            response
                .recv()
                .map_err(|_| EngineError::Stopped)?
                .map_err(EngineError::Uncaught)
        })
        .await
        .map_err(|_| EngineError::Stopped)?
    }

    /// Start recording storage mutations and deliver them on `changes`.
    pub fn watch_storage(&self, changes: async_mpsc::UnboundedSender<StorageChange>) -> bool {
        self.jobs.send(EngineJob::Watch(changes)).is_ok()
    }
}

fn run_engine(bootstrap: &str, inbox: mpsc::Receiver<EngineJob>) {
    let mut context = Context::default();
    let mut limits = RuntimeLimits::default();
    limits.set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    limits.set_recursion_limit(RECURSION_LIMIT);
    context.set_runtime_limits(limits);

    if let Err(error) = evaluate(&mut context, bootstrap) {
        warn!(error = %error, "Page bootstrap failed");
    }

    let mut watcher: Option<async_mpsc::UnboundedSender<StorageChange>> = None;
    while let Ok(job) = inbox.recv() {
        match job {
            EngineJob::Eval { source, reply } => {
                let result = evaluate(&mut context, &source);
                if let Some(changes) = &watcher {
                    forward_storage_changes(&mut context, changes);
                }
                let _ = reply.send(result);
            }
            EngineJob::Watch(changes) => {
                if let Err(error) = evaluate(&mut context, "__page.watching = true") {
                    warn!(error = %error, "Storage monitor could not be installed");
                    continue;
                }
                watcher = Some(changes);
            }
        }
    }
    debug!("Page engine stopped");
}

fn evaluate(context: &mut Context, source: &str) -> Result<String, String> {
    let value = context
        .eval(Source::from_bytes(source.as_bytes()))
        .map_err(|error| error.to_string())?;
    value
        .to_string(context)
        .map(|text| text.to_std_string_escaped())
        .map_err(|error| error.to_string())
}

fn forward_storage_changes(
    context: &mut Context,
    changes: &async_mpsc::UnboundedSender<StorageChange>,
) {
    let recorded = match evaluate(context, "JSON.stringify(__page.takeChanges())") {
        Ok(json) => json,
        Err(error) => {
            warn!(error = %error, "Storage changes could not be read");
            return;
        }
    };
    match serde_json::from_str::<Vec<StorageChange>>(&recorded) {
        Ok(recorded) => {
            for change in recorded {
                let _ = changes.send(change);
            }
        }
        Err(error) => warn!(error = %error, "Malformed storage change record"),
    }
}
