//! Structured injection (fast path).
//!
//! The source travels as an argument to a fixed wrapper function run through the page's
//! privileged injection primitive. The wrapper parenthesizes the source, so only a single
//! expression can succeed here; anything else throws and the caller falls back.

use crate::script::realm::{InjectionFailure, PageRealm};
use crate::script::value::canonicalize;
use std::fmt;
use tracing::debug;

/// Wrapper function executed in the page with the source text as its only argument.
pub const STRUCTURED_WRAPPER: &str = r#"function (source) {
  try {
    return (0, eval)('(' + source + '\n)');
  } catch (error) {
    throw error instanceof Error ? error : new Error(String(error));
  }
}"#;

/// Why the fast path gave up; every variant leads to inline-element injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The wrapper threw: a syntax error because the text was not a single expression,
    /// or the expression itself threw.
    Threw(String),
    /// The page refused the primitive.
    Blocked(String),
    Detached,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Threw(msg) => write!(f, "structured injection threw: {}", msg),
            FallbackReason::Blocked(msg) => write!(f, "structured injection blocked: {}", msg),
            FallbackReason::Detached => write!(f, "page detached during structured injection"),
        }
    }
}

impl From<InjectionFailure> for FallbackReason {
    fn from(failure: InjectionFailure) -> Self {
        match failure {
            InjectionFailure::Threw(msg) => FallbackReason::Threw(msg),
            InjectionFailure::Blocked(msg) => FallbackReason::Blocked(msg),
            InjectionFailure::Detached => FallbackReason::Detached,
        }
    }
}

/// Result of the fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredAttempt {
    Completed(String),
    Fallback(FallbackReason),
}

/// The expression text handed to the wrapper: trimmed, one trailing `;` dropped.
pub fn expression_argument(source: &str) -> &str {
    let text = source.trim();
    text.strip_suffix(';').unwrap_or(text).trim_end()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredInjector;

impl StructuredInjector {
    pub fn new() -> Self {
        Self
    }

    pub async fn attempt(&self, realm: &dyn PageRealm, source: &str) -> StructuredAttempt {
        let argument = expression_argument(source);
        match realm.call_function(STRUCTURED_WRAPPER, argument).await {
            Ok(value) => StructuredAttempt::Completed(canonicalize(&value)),
            Err(failure) => {
                let reason = FallbackReason::from(failure);
                debug!(reason = %reason, "Structured injection declined");
                StructuredAttempt::Fallback(reason)
            }
        }
    }
}
