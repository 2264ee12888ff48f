//! Two-step execution pipeline.
//!
//! Classification picks the first path. A structured attempt that fails for any reason
//! falls back to inline injection; the fallback is an explicit variant, never a
//! swallowed error.

use crate::config::InjectionConfig;
use crate::error::RelayError;
use crate::script::classifier::{classify, Classification, Strategy};
use crate::script::inline::InlineInjector;
use crate::script::realm::PageRealm;
use crate::script::structured::{FallbackReason, StructuredAttempt, StructuredInjector};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// The path that produced the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPath {
    Structured,
    InlineAfterFallback(FallbackReason),
    Inline,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Structured => write!(f, "structured"),
            ExecutionPath::InlineAfterFallback(reason) => write!(f, "inline (after {})", reason),
            ExecutionPath::Inline => write!(f, "inline"),
        }
    }
}

impl Serialize for ExecutionPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One execution with its trace.
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub classification: Classification,
    pub path: ExecutionPath,
    pub outcome: Result<String, RelayError>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    structured: StructuredInjector,
    inline: InlineInjector,
}

impl ScriptRunner {
    pub fn new(config: &InjectionConfig) -> Self {
        Self {
            structured: StructuredInjector::new(),
            inline: InlineInjector::new(config),
        }
    }

    /// Run `source` in `realm`, returning the canonical result string.
    pub async fn run(&self, realm: &dyn PageRealm, source: &str) -> Result<String, RelayError> {
        self.run_traced(realm, source).await.outcome
    }

    pub async fn run_traced(&self, realm: &dyn PageRealm, source: &str) -> ScriptRun {
        let classification = classify(source);
        let strategy = classification.strategy();
        debug!(
            kind = ?classification.kind,
            reason = %classification.reason,
            strategy = ?strategy,
            "Script classified"
        );

        let path = match strategy {
            Strategy::Structured => match self.structured.attempt(realm, source).await {
                StructuredAttempt::Completed(value) => {
                    return ScriptRun {
                        classification,
                        path: ExecutionPath::Structured,
                        outcome: Ok(value),
                    };
                }
                StructuredAttempt::Fallback(reason) => {
                    info!(reason = %reason, "Falling back to inline injection");
                    ExecutionPath::InlineAfterFallback(reason)
                }
            },
            Strategy::InlineElement => ExecutionPath::Inline,
        };

        let outcome = self.inline.inject(realm, source).await.into_result();
        ScriptRun {
            classification,
            path,
            outcome,
        }
    }
}
