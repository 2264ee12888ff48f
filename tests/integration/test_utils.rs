#![allow(dead_code)]

//! Shared test utilities for integration tests
//!
//! A [`Harness`] wires the full chain: retrying sender → relay service → counting
//! transport → tab host → remote responder → browser page. It also provides isolated
//! XDG/env setup for configuration tests.

use parking_lot::Mutex as PlMutex;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabrelay::config::RelayConfig;
use tabrelay::host::page::BrowserPage;
use tabrelay::host::TabHost;
use tabrelay::pending::PendingSlot;
use tabrelay::relay::{RelayCoordinator, RelayHandle, RelayService};
use tabrelay::remote::RemoteResponder;
use tabrelay::transport::Transport;
use tabrelay::{Command, ContextId, Outcome, RetryingSender, TransportError};
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Records every coordinator → remote send before passing it on to the host.
pub struct CountingTransport {
    inner: Arc<TabHost>,
    sent: PlMutex<Vec<(ContextId, String)>>,
}

impl CountingTransport {
    /// Sends of `action` to `context` so far.
    pub fn count(&self, context: ContextId, action: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(id, sent)| *id == context && sent == action)
            .count()
    }
}

#[async_trait::async_trait]
impl Transport for CountingTransport {
    async fn send(&self, context: ContextId, command: &Command) -> Result<Outcome, TransportError> {
        self.sent.lock().push((context, command.action.clone()));
        self.inner.send(context, command).await
    }
}

pub struct Harness {
    pub config: RelayConfig,
    pub host: Arc<TabHost>,
    pub transport: Arc<CountingTransport>,
    pub coordinator: Arc<RelayCoordinator>,
    pub handle: RelayHandle,
    pub service: JoinHandle<()>,
    pub sender: RetryingSender<RelayHandle>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(config: RelayConfig) -> Self {
        let host = Arc::new(TabHost::new());
        let transport = Arc::new(CountingTransport {
            inner: Arc::clone(&host),
            sent: PlMutex::new(Vec::new()),
        });
        let coordinator = Arc::new(RelayCoordinator::new(transport.clone(), &config.probe));
        let (handle, service) = RelayService::spawn(Arc::clone(&coordinator));
        host.set_lifecycle_sink(Arc::new(handle.clone()));
        let sender = RetryingSender::new(handle.clone(), &config.retry);
        Self {
            config,
            host,
            transport,
            coordinator,
            handle,
            service,
            sender,
        }
    }

    pub fn responder(&self, id: u32, page: &Arc<BrowserPage>) -> RemoteResponder {
        RemoteResponder::new(ContextId(id), page.clone(), &self.config.injection)
    }

    /// Open tab `id` and load `page` into it.
    pub fn open_page(&self, id: u32, page: &Arc<BrowserPage>) {
        self.host.open_tab(ContextId(id));
        self.load(id, self.responder(id, page));
    }

    /// Load a content script into an existing tab.
    pub fn load(&self, id: u32, responder: RemoteResponder) {
        self.host
            .attach(ContextId(id), Arc::new(responder), Arc::new(self.handle.clone()))
            .unwrap();
    }

    pub fn load_with_pending(&self, id: u32, page: &Arc<BrowserPage>, pending: PendingSlot) {
        self.load(id, self.responder(id, page).with_pending(pending));
    }

    /// Wait until the coordinator has recorded `id` as ready.
    pub async fn wait_ready(&self, id: u32) {
        let tracker_ready = async {
            while !self.coordinator.tracker().is_ready(ContextId(id)) {
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), tracker_ready)
            .await
            .expect("context never announced ready");
    }
}

pub fn page(url: &str, title: &str) -> Arc<BrowserPage> {
    Arc::new(BrowserPage::new(url, title))
}

/// Execution slots still defined on the page.
pub async fn leaked_slots(page: &BrowserPage) -> Vec<String> {
    page.global_names()
        .await
        .into_iter()
        .filter(|name| name.starts_with("__tabrelay_"))
        .collect()
}

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Run `f` with `XDG_CONFIG_HOME` and `HOME` pointed into `test_dir` and every
/// `TABRELAY_*` variable cleared; the previous environment is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let saved: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| {
            key == "HOME" || key == "XDG_CONFIG_HOME" || key.starts_with("TABRELAY")
        })
        .collect();
    for (key, _) in &saved {
        std::env::remove_var(key);
    }

    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().join("xdg"));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    let touched: Vec<String> = std::env::vars()
        .map(|(key, _)| key)
        .filter(|key| key == "HOME" || key == "XDG_CONFIG_HOME" || key.starts_with("TABRELAY"))
        .collect();
    for key in touched {
        std::env::remove_var(key);
    }
    for (key, value) in saved {
        std::env::set_var(key, value);
    }

    match result {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
