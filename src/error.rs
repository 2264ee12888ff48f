//! Error types for the relay protocol.
//!
//! Every failure a caller can observe is a [`RelayError`]. Its display text is what reaches
//! the end user; its [`ErrorKind`] is what the retrying sender uses to decide between
//! retrying and stopping.

use crate::types::ContextId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single cross-context send, as reported by the underlying channel.
///
/// The channel only gives us a message; see [`classify_transport_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        classify_transport_error(&self.message)
    }
}

/// Relay-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Content script not ready in tab {context}. Try refreshing the page.")]
    NotReady { context: ContextId },

    #[error("No active tab to send the command to")]
    NoTarget,

    #[error("Tab {context} is unreachable ({reason}). Reload the page and try again.")]
    Unreachable { context: ContextId, reason: String },

    #[error("Extension context invalidated. Reload the panel to reconnect.")]
    ChannelInvalidated,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{0}")]
    Execution(String),

    #[error("Script execution timed out after {waited_ms}ms (it may still be running)")]
    ExecutionTimeout { waited_ms: u64 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Pending script storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::NotReady { .. } => ErrorKind::NotReady,
            RelayError::NoTarget => ErrorKind::NoTarget,
            RelayError::Unreachable { .. } => ErrorKind::Unreachable,
            RelayError::ChannelInvalidated => ErrorKind::ChannelInvalidated,
            RelayError::UnknownAction(_) => ErrorKind::UnknownAction,
            RelayError::Execution(_) => ErrorKind::Execution,
            RelayError::ExecutionTimeout { .. } => ErrorKind::ExecutionTimeout,
            RelayError::InvalidPayload(_) => ErrorKind::UnknownAction,
            RelayError::Transport(_) | RelayError::Storage(_) | RelayError::Config(_) => {
                ErrorKind::Other
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Map a failed send to `context` into the relay taxonomy.
    pub fn from_transport(context: ContextId, err: &TransportError) -> Self {
        match err.kind() {
            ErrorKind::NotReady => RelayError::NotReady { context },
            ErrorKind::Unreachable => RelayError::Unreachable {
                context,
                reason: err.message.clone(),
            },
            ErrorKind::ChannelInvalidated => RelayError::ChannelInvalidated,
            ErrorKind::NoTarget => RelayError::NoTarget,
            ErrorKind::UnknownAction => RelayError::UnknownAction(err.message.clone()),
            _ => RelayError::Transport(err.message.clone()),
        }
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

/// Coarse classification used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotReady,
    NoTarget,
    Unreachable,
    ChannelInvalidated,
    UnknownAction,
    Execution,
    ExecutionTimeout,
    Other,
}

impl ErrorKind {
    /// Only "remote exists but has not confirmed readiness" is worth waiting out.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::NotReady)
    }
}

// Checked in order; the first group with a matching substring wins.
const CHANNEL_INVALIDATED_PATTERNS: &[&str] = &[
    "extension context invalidated",
    "context invalidated",
];
const UNREACHABLE_PATTERNS: &[&str] = &[
    "is unreachable",
    "no tab with id",
    "no such target",
    "tab was closed",
    "frame with id",
];
const UNKNOWN_ACTION_PATTERNS: &[&str] = &["unknown action"];
const NO_TARGET_PATTERNS: &[&str] = &["no active tab"];
const NOT_READY_PATTERNS: &[&str] = &[
    "not ready",
    "receiving end does not exist",
    "could not establish connection",
    "message port closed",
];

/// Classify a transport or reply error message.
///
/// The host channel reports failures only as text, so this is substring matching on
/// known wordings, case-insensitive. Every pattern lives in this one function.
pub fn classify_transport_error(message: &str) -> ErrorKind {
    let lowered = message.to_ascii_lowercase();
    let matches_any = |patterns: &[&str]| patterns.iter().any(|p| lowered.contains(p));

    if matches_any(CHANNEL_INVALIDATED_PATTERNS) {
        ErrorKind::ChannelInvalidated
    } else if matches_any(UNREACHABLE_PATTERNS) {
        ErrorKind::Unreachable
    } else if matches_any(UNKNOWN_ACTION_PATTERNS) {
        ErrorKind::UnknownAction
    } else if matches_any(NO_TARGET_PATTERNS) {
        ErrorKind::NoTarget
    } else if matches_any(NOT_READY_PATTERNS) {
        ErrorKind::NotReady
    } else {
        ErrorKind::Other
    }
}
