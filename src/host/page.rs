//! In-memory browser page that runs real JavaScript.
//!
//! Each page owns a boa engine with a small browser-like global environment: `window`,
//! `document.title`, `location.href`, a silent `console`, and `localStorage` /
//! `sessionStorage` that record their own mutations once monitored. Script elements run
//! their text in that engine, so injected programs report through real page globals.

mod engine;

use crate::script::realm::{
    InjectionFailure, PageInfo, PageRealm, ScriptElement, StorageArea, StorageChange,
};
use crate::script::value::RemoteValue;
use async_trait::async_trait;
use engine::{EngineError, PageEngine};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const BOOTSTRAP: &str = r#"
globalThis.window = globalThis;
globalThis.self = globalThis;
globalThis.console = {
  log: function () {},
  info: function () {},
  warn: function () {},
  error: function () {}
};
Object.defineProperty(globalThis, '__page', {
  enumerable: false,
  value: (function () {
    var page = { watching: false, changes: [] };

    function record(area, key, oldValue, newValue) {
      if (page.watching) {
        page.changes.push({ area: area, key: key, old_value: oldValue, new_value: newValue });
      }
    }

    function makeStorage(area) {
      var items = new Map();
      return {
        getItem: function (key) {
          key = String(key);
          return items.has(key) ? items.get(key) : null;
        },
        setItem: function (key, value) {
          key = String(key);
          value = String(value);
          var previous = items.has(key) ? items.get(key) : null;
          items.set(key, value);
          record(area, key, previous, value);
        },
        removeItem: function (key) {
          key = String(key);
          if (!items.has(key)) {
            return;
          }
          var previous = items.get(key);
          items.delete(key);
          record(area, key, previous, null);
        },
        clear: function () {
          items.clear();
          record(area, null, null, null);
        },
        key: function (index) {
          var keys = Array.from(items.keys());
          return index < keys.length ? keys[index] : null;
        },
        get length() {
          return items.size;
        },
        snapshot: function () {
          var out = {};
          items.forEach(function (value, key) { out[key] = value; });
          return out;
        }
      };
    }

    page.storage = { local: makeStorage('local'), session: makeStorage('session') };

    page.takeChanges = function () {
      var taken = page.changes;
      page.changes = [];
      return taken;
    };

    function describe(value, ancestors) {
      switch (typeof value) {
        case 'undefined': return { t: 'undefined' };
        case 'boolean': return { t: 'bool', v: value };
        case 'number': return { t: 'number', v: String(value) };
        case 'bigint': return { t: 'bigint', v: String(value) };
        case 'string': return { t: 'string', v: value };
        case 'symbol':
          return { t: 'symbol', v: value.description === undefined ? '' : String(value.description) };
        case 'function': return { t: 'function', v: Function.prototype.toString.call(value) };
      }
      if (value === null) {
        return { t: 'null' };
      }
      if (ancestors.indexOf(value) !== -1) {
        return { t: 'cycle' };
      }
      if (typeof value.toJSON === 'function') {
        var json = value.toJSON();
        if (json !== value) {
          return describe(json, ancestors);
        }
      }
      ancestors.push(value);
      var described;
      if (Array.isArray(value)) {
        var items = [];
        for (var i = 0; i < value.length; i++) {
          items.push(describe(value[i], ancestors));
        }
        described = { t: 'array', v: items };
      } else {
        described = {
          t: 'object',
          v: Object.keys(value).map(function (key) { return [key, describe(value[key], ancestors)]; })
        };
      }
      ancestors.pop();
      return described;
    }

    page.capture = function (thunk) {
      try {
        return JSON.stringify({ ok: true, value: describe(thunk(), []) });
      } catch (error) {
        return JSON.stringify({ ok: false, error: String(error) });
      }
    };

    return page;
  })()
});
globalThis.localStorage = __page.storage.local;
globalThis.sessionStorage = __page.storage.session;
"#;

fn js_literal(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

/// Page value as reported by the page's `describe` helper.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum Described {
    Undefined,
    Null,
    Bool(bool),
    Number(String),
    BigInt(String),
    String(String),
    Symbol(String),
    Function(String),
    Array(Vec<Described>),
    Object(Vec<(String, Described)>),
    Cycle,
}

impl From<Described> for RemoteValue {
    fn from(value: Described) -> Self {
        match value {
            Described::Undefined => RemoteValue::Undefined,
            Described::Null => RemoteValue::Null,
            Described::Bool(b) => RemoteValue::Bool(b),
            Described::Number(text) => RemoteValue::Number(match text.as_str() {
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other.parse().unwrap_or(f64::NAN),
            }),
            Described::BigInt(digits) => RemoteValue::BigInt(digits),
            Described::String(s) => RemoteValue::String(s),
            Described::Symbol(description) => RemoteValue::Symbol(description),
            Described::Function(source) => RemoteValue::Function(source),
            Described::Array(items) => RemoteValue::Array(items.into_iter().map(Into::into).collect()),
            Described::Object(entries) => RemoteValue::Object(
                entries.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
            Described::Cycle => RemoteValue::Cycle,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Captured {
    ok: bool,
    value: Option<Described>,
    error: Option<String>,
}

pub struct BrowserPage {
    engine: PageEngine,
    elements: Mutex<HashSet<String>>,
    script_latency: Mutex<Duration>,
    structured_blocked: AtomicBool,
    structured_calls: AtomicUsize,
    inline_calls: AtomicUsize,
}

impl BrowserPage {
    pub fn new(url: &str, title: &str) -> Self {
        let bootstrap = format!(
            "{}\nglobalThis.document = {{ title: {title}, URL: {url} }};\nglobalThis.location = {{ href: {url} }};\n",
            BOOTSTRAP,
            title = js_literal(title),
            url = js_literal(url),
        );
        Self {
            engine: PageEngine::spawn(bootstrap),
            elements: Mutex::new(HashSet::new()),
            script_latency: Mutex::new(Duration::ZERO),
            structured_blocked: AtomicBool::new(false),
            structured_calls: AtomicUsize::new(0),
            inline_calls: AtomicUsize::new(0),
        }
    }

    /// Refuse the structured primitive, as a strict content policy would.
    pub fn block_structured(&self, blocked: bool) {
        self.structured_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Delay before an attached script element runs, as on a busy main thread.
    pub fn set_script_latency(&self, latency: Duration) {
        *self.script_latency.lock() = latency;
    }

    /// Run the page's own code, outside any injection path.
    pub async fn run_page_script(&self, source: &str) -> Result<RemoteValue, InjectionFailure> {
        self.capture(format!(
            "__page.capture(function () {{ return (0, eval)({}); }})",
            js_literal(source)
        ))
        .await
    }

    /// Own property names of the page's global object, sorted.
    pub async fn global_names(&self) -> Vec<String> {
        let names = self
            .engine
            .eval("JSON.stringify(Object.getOwnPropertyNames(globalThis))".to_string())
            .await
            .ok()
            .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok());
        let mut names = names.unwrap_or_default();
        names.sort();
        names
    }

    pub fn element_count(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn inline_calls(&self) -> usize {
        self.inline_calls.load(Ordering::SeqCst)
    }

    async fn capture(&self, source: String) -> Result<RemoteValue, InjectionFailure> {
        let json = self.engine.eval(source).await.map_err(|error| match error {
            EngineError::Stopped => InjectionFailure::Detached,
            EngineError::Uncaught(message) => InjectionFailure::Threw(message),
        })?;
        let captured: Captured = serde_json::from_str(&json)
            .map_err(|error| InjectionFailure::Threw(format!("unreadable page value: {}", error)))?;
        if captured.ok {
            Ok(captured.value.map(Into::into).unwrap_or(RemoteValue::Undefined))
        } else {
            Err(InjectionFailure::Threw(captured.error.unwrap_or_default()))
        }
    }

    async fn eval_quiet(&self, source: String) -> Option<String> {
        match self.engine.eval(source).await {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(error = %error, "Page evaluation failed");
                None
            }
        }
    }
}

async fn run_element(engine: &PageEngine, element_id: &str, text: String) -> Result<(), EngineError> {
    match engine.eval(text).await {
        // Uncaught errors go to the page's error handler, not to whoever attached the element.
        Err(EngineError::Uncaught(error)) => {
            debug!(element_id, error = %error, "Script element raised an uncaught error");
            Ok(())
        }
        other => other.map(|_| ()),
    }
}

#[async_trait]
impl PageRealm for BrowserPage {
    async fn call_function(
        &self,
        function_source: &str,
        argument: &str,
    ) -> Result<RemoteValue, InjectionFailure> {
        if self.structured_blocked.load(Ordering::SeqCst) {
            return Err(InjectionFailure::Blocked(
                "Refused to evaluate a string as JavaScript".to_string(),
            ));
        }
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.capture(format!(
            "__page.capture(function () {{ return ({})({}); }})",
            function_source,
            js_literal(argument)
        ))
        .await
    }

    async fn append_script(&self, element: &ScriptElement) -> Result<(), InjectionFailure> {
        self.inline_calls.fetch_add(1, Ordering::SeqCst);
        self.elements.lock().insert(element.element_id.clone());

        let latency = *self.script_latency.lock();
        if latency.is_zero() {
            return run_element(&self.engine, &element.element_id, element.text.clone())
                .await
                .map_err(|_| InjectionFailure::Detached);
        }
        let engine = self.engine.clone();
        let element = element.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let _ = run_element(&engine, &element.element_id, element.text).await;
        });
        Ok(())
    }

    async fn remove_element(&self, element_id: &str) -> bool {
        self.elements.lock().remove(element_id)
    }

    async fn read_global(&self, name: &str) -> RemoteValue {
        self.capture(format!(
            "__page.capture(function () {{ return window[{}]; }})",
            js_literal(name)
        ))
        .await
        .unwrap_or(RemoteValue::Undefined)
    }

    async fn delete_global(&self, name: &str) {
        self.eval_quiet(format!("delete window[{}]", js_literal(name))).await;
    }

    async fn has_global(&self, name: &str) -> bool {
        self.eval_quiet(format!("{} in window", js_literal(name)))
            .await
            .is_some_and(|answer| answer == "true")
    }

    async fn page_info(&self) -> PageInfo {
        self.eval_quiet(
            "JSON.stringify({ url: String(location.href), title: String(document.title) })"
                .to_string(),
        )
        .await
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_else(|| PageInfo {
            url: String::new(),
            title: String::new(),
        })
    }

    async fn storage_items(&self, area: StorageArea) -> BTreeMap<String, String> {
        self.eval_quiet(format!(
            "JSON.stringify(__page.storage[{}].snapshot())",
            area_literal(area)
        ))
        .await
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
    }

    async fn set_storage_item(&self, area: StorageArea, key: &str, value: &str) {
        self.eval_quiet(format!(
            "__page.storage[{}].setItem({}, {})",
            area_literal(area),
            js_literal(key),
            js_literal(value)
        ))
        .await;
    }

    async fn remove_storage_item(&self, area: StorageArea, key: &str) {
        self.eval_quiet(format!(
            "__page.storage[{}].removeItem({})",
            area_literal(area),
            js_literal(key)
        ))
        .await;
    }

    async fn clear_storage(&self, area: StorageArea) {
        self.eval_quiet(format!("__page.storage[{}].clear()", area_literal(area)))
            .await;
    }

    async fn watch_storage(&self) -> Option<mpsc::UnboundedReceiver<StorageChange>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.engine.watch_storage(tx).then_some(rx)
    }
}

fn area_literal(area: StorageArea) -> String {
    serde_json::to_string(&area).unwrap_or_else(|_| "\"local\"".to_string())
}
