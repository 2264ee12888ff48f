//! Script Classifier
//!
//! Pure mapping from source text to an execution strategy. Structured injection can only
//! host a single expression, so it is chosen only for text that syntactically looks like
//! one; everything else goes to inline-element injection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// How the source text was judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    SimpleExpression,
    ComplexStatement,
    Unknown,
}

/// Execution path to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Structured,
    InlineElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ScriptKind,
    pub reason: String,
}

impl Classification {
    fn new(kind: ScriptKind, reason: &str) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }

    /// Unknown text defaults to the inline path.
    pub fn strategy(&self) -> Strategy {
        match self.kind {
            ScriptKind::SimpleExpression => Strategy::Structured,
            ScriptKind::ComplexStatement | ScriptKind::Unknown => Strategy::InlineElement,
        }
    }
}

fn compile(patterns: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    patterns
        .iter()
        .filter_map(|(pattern, reason)| Regex::new(pattern).ok().map(|re| (re, *reason)))
        .collect()
}

static COMPLEX_INDICATORS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    compile(&[
        (r"[{}]", "contains block braces"),
        (r"\b(?:var|let|const)\b", "declares a variable"),
        (r"\b(?:function|class)\b", "declares a function or class"),
        (r"=>", "contains an arrow function"),
        (
            r"\b(?:if|else|for|while|do|switch|try|catch|finally|return|throw)\b",
            "uses control flow",
        ),
        (r";\s*\S", "contains multiple statements"),
    ])
});

static SIMPLE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    compile(&[
        (
            r#"^(?:'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|-?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?|true|false|null|undefined|NaN|Infinity)$"#,
            "literal value",
        ),
        (
            r#"^[A-Za-z_$][\w$]*(?:\s*(?:\.\s*[A-Za-z_$][\w$]*|\[\s*(?:\d+|'[^']*'|"[^"]*")\s*\]|\([^()]*\)))*$"#,
            "property access or call chain",
        ),
        (
            r"^(?:document|window|Math|JSON|navigator|location|localStorage|sessionStorage|history|screen|performance|console|Date|Object|Array|Number|String|Boolean|Intl)\s*[.\[(]",
            "rooted at a known global",
        ),
    ])
});

/// Classify `source`. First match wins: complex indicators, then simple-expression
/// patterns, else unknown.
pub fn classify(source: &str) -> Classification {
    let text = source.trim();
    if text.is_empty() {
        return Classification::new(ScriptKind::Unknown, "empty source");
    }

    if let Some((_, reason)) = COMPLEX_INDICATORS.iter().find(|(re, _)| re.is_match(text)) {
        return Classification::new(ScriptKind::ComplexStatement, reason);
    }

    // A single trailing semicolon does not make an expression a statement list.
    let expression = text.strip_suffix(';').unwrap_or(text).trim_end();
    if let Some((_, reason)) = SIMPLE_PATTERNS.iter().find(|(re, _)| re.is_match(expression)) {
        return Classification::new(ScriptKind::SimpleExpression, reason);
    }

    Classification::new(ScriptKind::Unknown, "no simple-expression pattern matched")
}
