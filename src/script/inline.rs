//! Inline-element injection (universal path).
//!
//! The source is wrapped in a program that reports through three single-use globals
//! (`<id>_result`, `<id>_error`, `<id>_complete`), placed in a page-owned script element,
//! and run by the page's own engine with the page's own permissions. The injector polls
//! the completion flag, reads the slots back, and always removes the element and all
//! three slots, including after a timeout.

use crate::config::InjectionConfig;
use crate::error::RelayError;
use crate::script::lexer::with_completion_value;
use crate::script::realm::{InjectionFailure, PageRealm, ScriptElement};
use crate::script::value::canonicalize;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Names of the three page globals owned by one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotNames {
    pub result: String,
    pub error: String,
    pub complete: String,
}

impl SlotNames {
    pub fn for_exec(exec_id: &str) -> Self {
        Self {
            result: format!("{}_result", exec_id),
            error: format!("{}_error", exec_id),
            complete: format!("{}_complete", exec_id),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.result, &self.error, &self.complete]
    }
}

/// A rendered inline program, ready to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineProgram {
    pub exec_id: String,
    pub slots: SlotNames,
    pub element: ScriptElement,
}

impl InlineProgram {
    /// Build a program for `source` under a fresh random execution id.
    pub fn new(source: &str) -> Self {
        Self::with_exec_id(new_exec_id(), source)
    }

    pub fn with_exec_id(exec_id: String, source: &str) -> Self {
        let slots = SlotNames::for_exec(&exec_id);
        let text = render_program(&slots, source);
        let element = ScriptElement {
            element_id: format!("{}_script", exec_id),
            exec_id: exec_id.clone(),
            text,
        };
        Self {
            exec_id,
            slots,
            element,
        }
    }
}

/// Fresh single-use execution id, usable as a JS identifier prefix.
pub fn new_exec_id() -> String {
    format!("__tabrelay_{}", Uuid::new_v4().simple())
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// Wrapper program text for `source`.
pub fn render_program(slots: &SlotNames, source: &str) -> String {
    let body = with_completion_value(source);
    format!(
        r#"(function () {{
  var R = {result}, E = {error}, C = {complete};
  window[R] = undefined;
  window[E] = undefined;
  window[C] = undefined;
  try {{
    window[R] = (function () {{
{body}
    }})();
  }} catch (error) {{
    window[E] = error && error.message ? error.message : String(error);
  }} finally {{
    window[C] = true;
  }}
}})();"#,
        result = js_string(&slots.result),
        error = js_string(&slots.error),
        complete = js_string(&slots.complete),
        body = body,
    )
}

/// How one inline execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineResult {
    Completed(String),
    Threw(String),
    /// The completion flag never appeared; the code may still be running.
    TimedOut { waited: Duration },
    /// The element could not be attached.
    Failed(InjectionFailure),
}

impl InlineResult {
    pub fn into_result(self) -> Result<String, RelayError> {
        match self {
            InlineResult::Completed(value) => Ok(value),
            InlineResult::Threw(message) => Err(RelayError::Execution(message)),
            InlineResult::TimedOut { waited } => Err(RelayError::ExecutionTimeout {
                waited_ms: waited.as_millis() as u64,
            }),
            InlineResult::Failed(InjectionFailure::Threw(message)) => {
                Err(RelayError::Execution(message))
            }
            InlineResult::Failed(InjectionFailure::Blocked(message)) => Err(RelayError::Execution(
                format!("Script injection blocked: {}", message),
            )),
            InlineResult::Failed(InjectionFailure::Detached) => Err(RelayError::Execution(
                "Page detached before the script could run".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InlineInjector {
    poll_interval: Duration,
    max_polls: u32,
}

impl Default for InlineInjector {
    fn default() -> Self {
        Self::new(&InjectionConfig::default())
    }
}

impl InlineInjector {
    pub fn new(config: &InjectionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_polls: config.max_poll_attempts.max(1),
        }
    }

    pub async fn inject(&self, realm: &dyn PageRealm, source: &str) -> InlineResult {
        self.inject_program(realm, &InlineProgram::new(source)).await
    }

    pub async fn inject_program(&self, realm: &dyn PageRealm, program: &InlineProgram) -> InlineResult {
        let exec_id = program.exec_id.as_str();
        debug!(exec_id, "Attaching inline script element");

        if let Err(failure) = realm.append_script(&program.element).await {
            warn!(exec_id, error = %failure, "Inline script element could not be attached");
            cleanup(realm, program).await;
            return InlineResult::Failed(failure);
        }

        let started = Instant::now();
        let mut polls = 0;
        let completed = loop {
            polls += 1;
            if realm.read_global(&program.slots.complete).await.is_truthy() {
                break true;
            }
            if polls >= self.max_polls {
                break false;
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        let result = realm.read_global(&program.slots.result).await;
        let error = realm.read_global(&program.slots.error).await;
        cleanup(realm, program).await;

        if !completed {
            let waited = started.elapsed();
            warn!(exec_id, polls, waited_ms = waited.as_millis() as u64, "Inline script timed out");
            return InlineResult::TimedOut { waited };
        }
        debug!(exec_id, polls, "Inline script completed");
        if !error.is_undefined() {
            return InlineResult::Threw(canonicalize(&error));
        }
        InlineResult::Completed(canonicalize(&result))
    }
}

/// Remove the element, then the result, error and completion slots.
async fn cleanup(realm: &dyn PageRealm, program: &InlineProgram) {
    realm.remove_element(&program.element.element_id).await;
    for slot in program.slots.all() {
        realm.delete_global(slot).await;
    }
}
