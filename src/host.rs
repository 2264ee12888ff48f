//! In-process host fabric.
//!
//! Models the browser's tab registry: tabs come and go, keep their id across reloads,
//! and run one remote responder each as a tokio task. The coordinator reaches them
//! through the [`Transport`] impl, which reports failures with the host's own wording.

pub mod page;

use crate::error::{RelayError, TransportError};
use crate::remote::RemoteResponder;
use crate::transport::{LifecycleEvent, LifecycleSink, ReadinessAnnouncer, Transport};
use crate::types::{Command, ContextId, Outcome};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

const LISTENER_CAPACITY: usize = 32;
const NOT_CONNECTED: &str = "Could not establish connection. Receiving end does not exist.";
const PORT_CLOSED: &str = "The message port closed before a response was received.";

struct Envelope {
    command: Command,
    reply: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct TabEntry {
    listener: Option<mpsc::Sender<Envelope>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TabEntry {
    fn tear_down(&mut self) {
        self.listener = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[derive(Default)]
pub struct TabHost {
    tabs: RwLock<HashMap<ContextId, TabEntry>>,
    lifecycle: RwLock<Option<Arc<dyn LifecycleSink>>>,
}

impl TabHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route navigation and teardown notices to `sink`.
    pub fn set_lifecycle_sink(&self, sink: Arc<dyn LifecycleSink>) {
        *self.lifecycle.write() = Some(sink);
    }

    /// Open a tab with no content script yet. Returns `false` if the id is taken.
    pub fn open_tab(&self, context: ContextId) -> bool {
        let mut tabs = self.tabs.write();
        if tabs.contains_key(&context) {
            return false;
        }
        tabs.insert(context, TabEntry::default());
        debug!(context = %context, "Tab opened");
        true
    }

    /// Load `responder` into the tab: install its listener, then start it.
    pub fn attach(
        &self,
        context: ContextId,
        responder: Arc<RemoteResponder>,
        announcer: Arc<dyn ReadinessAnnouncer>,
    ) -> Result<(), RelayError> {
        let mut tabs = self.tabs.write();
        let entry = tabs.get_mut(&context).ok_or_else(|| RelayError::Unreachable {
            context,
            reason: format!("No tab with id: {}.", context),
        })?;
        entry.tear_down();

        let (tx, rx) = mpsc::channel(LISTENER_CAPACITY);
        entry.listener = Some(tx);
        entry
            .tasks
            .push(tokio::spawn(listen(Arc::clone(&responder), rx)));
        entry.tasks.push(tokio::spawn(async move {
            responder.start(announcer.as_ref()).await;
        }));
        debug!(context = %context, "Content script attached");
        Ok(())
    }

    /// Start loading a new document in the tab. The old instance and its listener are
    /// gone; the id stays.
    pub fn reload(&self, context: ContextId) -> bool {
        let found = match self.tabs.write().get_mut(&context) {
            Some(entry) => {
                entry.tear_down();
                true
            }
            None => false,
        };
        if found {
            info!(context = %context, "Tab reloaded");
            self.notify(LifecycleEvent::Navigated(context));
        }
        found
    }

    pub fn close(&self, context: ContextId) -> bool {
        let removed = self.tabs.write().remove(&context);
        match removed {
            Some(mut entry) => {
                entry.tear_down();
                info!(context = %context, "Tab closed");
                self.notify(LifecycleEvent::Removed(context));
                true
            }
            None => false,
        }
    }

    /// Open tab ids, sorted.
    pub fn tab_ids(&self) -> Vec<ContextId> {
        let mut ids: Vec<_> = self.tabs.read().keys().copied().collect();
        ids.sort();
        ids
    }

    fn notify(&self, event: LifecycleEvent) {
        let sink = self.lifecycle.read().clone();
        if let Some(sink) = sink {
            sink.notify(event);
        }
    }
}

/// Content-script message loop. Each command gets its own task; aborting the loop
/// aborts them too.
async fn listen(responder: Arc<RemoteResponder>, mut inbox: mpsc::Receiver<Envelope>) {
    let mut inflight = JoinSet::new();
    loop {
        tokio::select! {
            envelope = inbox.recv() => {
                let Some(Envelope { command, reply }) = envelope else {
                    break;
                };
                let responder = Arc::clone(&responder);
                inflight.spawn(async move {
                    let outcome = responder.handle(&command).await;
                    let _ = reply.send(outcome);
                });
            }
            Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
        }
    }
}

#[async_trait]
impl Transport for TabHost {
    async fn send(&self, context: ContextId, command: &Command) -> Result<Outcome, TransportError> {
        let listener = match self.tabs.read().get(&context) {
            Some(entry) => entry.listener.clone(),
            None => return Err(TransportError::new(format!("No tab with id: {}.", context))),
        };
        let listener = listener.ok_or_else(|| TransportError::new(NOT_CONNECTED))?;

        let (reply, receiver) = oneshot::channel();
        listener
            .send(Envelope {
                command: command.clone(),
                reply,
            })
            .await
            .map_err(|_| TransportError::new(NOT_CONNECTED))?;
        receiver.await.map_err(|_| TransportError::new(PORT_CLOSED))
    }
}
