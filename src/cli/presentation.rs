//! CLI presentation: execution plans and their text rendering.

use crate::config::InjectionConfig;
use crate::script::classifier::{classify, Classification, Strategy};
use crate::script::inline::{InlineProgram, SlotNames};
use crate::script::structured::{expression_argument, STRUCTURED_WRAPPER};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Serialize)]
pub struct StructuredPlan {
    pub wrapper: String,
    pub argument: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlinePlan {
    pub exec_id: String,
    pub element_id: String,
    pub slots: SlotNames,
    pub program: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

/// What running a source would inject, in order.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub source: String,
    pub classification: Classification,
    pub strategy: Strategy,
    /// Present only when the fast path is tried first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredPlan>,
    pub inline: InlinePlan,
}

impl ExecutionPlan {
    pub fn build(source: &str, injection: &InjectionConfig) -> Self {
        let classification = classify(source);
        let strategy = classification.strategy();
        let structured = (strategy == Strategy::Structured).then(|| StructuredPlan {
            wrapper: STRUCTURED_WRAPPER.to_string(),
            argument: expression_argument(source).to_string(),
        });
        let program = InlineProgram::new(source);
        Self {
            source: source.to_string(),
            classification,
            strategy,
            structured,
            inline: InlinePlan {
                exec_id: program.exec_id,
                element_id: program.element.element_id,
                slots: program.slots,
                program: program.element.text,
                poll_interval_ms: injection.poll_interval_ms,
                max_poll_attempts: injection.max_poll_attempts,
            },
        }
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Structured => "structured",
        Strategy::InlineElement => "inline-element",
    }
}

/// One-line classification summary.
pub fn format_classification_text(classification: &Classification) -> String {
    format!(
        "{:?} -> {} ({})",
        classification.kind,
        strategy_label(classification.strategy()),
        classification.reason
    )
}

pub fn format_plan_text(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Classification: {}", format_classification_text(&plan.classification));

    if let Some(structured) = &plan.structured {
        let _ = writeln!(out);
        let _ = writeln!(out, "Step 1: structured injection");
        let _ = writeln!(out, "  argument: {}", structured.argument);
        let _ = writeln!(out, "  wrapper:");
        for line in structured.wrapper.lines() {
            let _ = writeln!(out, "    {}", line);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Step 2 (only if step 1 fails): inline-element injection");
    } else {
        let _ = writeln!(out);
        let _ = writeln!(out, "Step 1: inline-element injection");
    }

    let inline = &plan.inline;
    let _ = writeln!(out, "  element: {}", inline.element_id);
    let _ = writeln!(
        out,
        "  slots: {}, {}, {}",
        inline.slots.result, inline.slots.error, inline.slots.complete
    );
    let _ = writeln!(
        out,
        "  polling: every {}ms, at most {} checks",
        inline.poll_interval_ms, inline.max_poll_attempts
    );
    let _ = writeln!(out, "  program:");
    for line in inline.program.lines() {
        let _ = writeln!(out, "    {}", line);
    }
    out.trim_end().to_string()
}
