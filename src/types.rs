//! Core types shared by every context: identifiers, commands, and replies.

use crate::error::{ErrorKind, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Action answered by the remote responder in every lifecycle state.
pub const ACTION_PING: &str = "ping";
/// Runs arbitrary source text in the remote page.
pub const ACTION_EXECUTE_SCRIPT: &str = "executeScript";
pub const ACTION_GET_PAGE_INFO: &str = "getPageInfo";
pub const ACTION_GET_STORAGE: &str = "getStorage";
pub const ACTION_SET_STORAGE: &str = "setStorage";
pub const ACTION_REMOVE_STORAGE: &str = "removeStorage";
pub const ACTION_CLEAR_STORAGE: &str = "clearStorage";
pub const ACTION_GET_STORAGE_CHANGES: &str = "getStorageChanges";

/// Identifier of one isolated remote context (a tab id).
///
/// The host may reuse the same value after a navigation or reload, so holding a
/// `ContextId` says nothing about whether the instance behind it is still the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ContextId {
    fn from(value: u32) -> Self {
        ContextId(value)
    }
}

/// A caller-constructed command. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

impl Command {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }

    /// Liveness probe sent by the coordinator.
    pub fn ping() -> Self {
        Self::new(ACTION_PING, json!({}))
    }

    /// `executeScript` specialization carrying the source text.
    pub fn execute_script(source: impl Into<String>) -> Self {
        Self::new(ACTION_EXECUTE_SCRIPT, json!({ "code": source.into() }))
    }

    pub fn is_ping(&self) -> bool {
        self.action == ACTION_PING
    }
}

/// Command addressed to a remote context, as handed to the coordinator.
///
/// `target` is `None` when the caller has no active context at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub target: Option<ContextId>,
    pub command: Command,
}

impl RelayRequest {
    pub fn new(target: Option<ContextId>, command: Command) -> Self {
        Self { target, command }
    }
}

/// Reply envelope every handler produces: `{ success, result?, error?, kind? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured error classification, when the producer knew it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl Outcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            kind: None,
        }
    }

    pub fn failure(error: &RelayError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
        }
    }

    /// Reply to a liveness probe.
    pub fn readiness(ready: bool) -> Self {
        Self::ok(json!({ "ready": ready }))
    }

    /// The `ready` flag of a ping reply, if this is one.
    pub fn ready_flag(&self) -> Option<bool> {
        if !self.success {
            return None;
        }
        self.result
            .as_ref()
            .and_then(|r| r.get("ready"))
            .and_then(Value::as_bool)
    }

    /// Error classification: the structured `kind` when present, otherwise the
    /// message text run through the transport-error patterns.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        if self.success {
            return None;
        }
        if let Some(kind) = self.kind {
            return Some(kind);
        }
        Some(
            self.error
                .as_deref()
                .map(crate::error::classify_transport_error)
                .unwrap_or(ErrorKind::Other),
        )
    }
}

impl From<Result<Value, RelayError>> for Outcome {
    fn from(result: Result<Value, RelayError>) -> Self {
        match result {
            Ok(value) => Outcome::ok(value),
            Err(err) => Outcome::failure(&err),
        }
    }
}

/// Result of running a script: the result is always a canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl From<Outcome> for ExecutionOutcome {
    fn from(outcome: Outcome) -> Self {
        if !outcome.success {
            return ExecutionOutcome::failed(
                outcome
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            );
        }
        match outcome.result {
            Some(Value::String(s)) => ExecutionOutcome::completed(s),
            // Handlers always canonicalize; anything else came from a foreign producer.
            Some(other) => ExecutionOutcome::completed(other.to_string()),
            None => ExecutionOutcome::completed("undefined"),
        }
    }
}
