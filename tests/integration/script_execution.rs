//! Script runner against a browser page, without the relay in between.

use crate::integration::test_utils::{leaked_slots, page};
use std::time::Duration;
use tabrelay::config::InjectionConfig;
use tabrelay::script::inline::{InlineInjector, InlineProgram, InlineResult};
use tabrelay::script::structured::FallbackReason;
use tabrelay::script::{ExecutionPath, PageRealm, ScriptKind, ScriptRunner};
use tabrelay::RelayError;
use tokio::time::Instant;

fn runner() -> ScriptRunner {
    ScriptRunner::new(&InjectionConfig::default())
}

#[tokio::test(start_paused = true)]
async fn simple_expression_stays_on_structured_path() {
    let page = page("https://example.com/a", "Example");
    let run = runner().run_traced(page.as_ref(), "location.href").await;

    assert_eq!(run.classification.kind, ScriptKind::SimpleExpression);
    assert_eq!(run.path, ExecutionPath::Structured);
    assert_eq!(run.outcome, Ok("https://example.com/a".to_string()));
    assert_eq!(page.inline_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn complex_statement_goes_straight_to_inline() {
    let page = page("https://example.com/", "Example");
    let run = runner()
        .run_traced(page.as_ref(), "const items = [1, 2, 3]; items.length")
        .await;

    assert_eq!(run.classification.kind, ScriptKind::ComplexStatement);
    assert_eq!(run.path, ExecutionPath::Inline);
    assert_eq!(run.outcome, Ok("3".to_string()));
    assert_eq!(page.structured_calls(), 0);
    assert!(leaked_slots(&page).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn structured_syntax_error_records_fallback_reason() {
    let page = page("https://example.com/", "Example");
    page.run_page_script("window.app = { state: function () { return 'idle'; } }")
        .await
        .unwrap();

    let run = runner()
        .run_traced(page.as_ref(), "console.log('checking')\napp.state()")
        .await;

    match &run.path {
        ExecutionPath::InlineAfterFallback(FallbackReason::Threw(message)) => {
            assert!(message.starts_with("SyntaxError"), "{message}")
        }
        other => panic!("expected a fallback after a throw, got {other}"),
    }
    assert!(run
        .path
        .to_string()
        .starts_with("inline (after structured injection threw: SyntaxError"));
    assert_eq!(run.outcome, Ok("idle".to_string()));
}

#[tokio::test(start_paused = true)]
async fn genuine_runtime_error_surfaces_after_fallback() {
    let page = page("https://example.com/", "Example");
    let run = runner().run_traced(page.as_ref(), "missingThing").await;

    assert!(matches!(run.path, ExecutionPath::InlineAfterFallback(_)));
    match &run.outcome {
        Err(RelayError::Execution(message)) => {
            assert!(message.contains("missingThing"), "{message}");
            assert!(message.contains("not defined"), "{message}");
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    assert_eq!(page.inline_calls(), 1);
    assert!(leaked_slots(&page).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn results_are_canonicalized() {
    let page = page("https://example.com/", "Example");
    let runner = runner();

    let object = runner
        .run(page.as_ref(), "const o = { a: 1 }; o.b = true; o")
        .await
        .unwrap();
    assert_eq!(object, "{\n  \"a\": 1,\n  \"b\": true\n}");

    assert_eq!(
        runner.run(page.as_ref(), "let nothing; nothing").await,
        Ok("undefined".to_string())
    );
    assert_eq!(runner.run(page.as_ref(), "null").await, Ok("null".to_string()));
    assert_eq!(
        runner.run(page.as_ref(), "const big = 1e21; [big, 1e-7]").await,
        Ok("[\n  1e+21,\n  1e-7\n]".to_string())
    );
    assert_eq!(
        runner.run(page.as_ref(), "const a = {}; a.self = a; a").await,
        Ok("[object Object]".to_string())
    );
    assert_eq!(
        runner.run(page.as_ref(), "({return: 1})").await,
        Ok("{\n  \"return\": 1\n}".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn poll_ceiling_is_configurable() {
    let page = page("https://example.com/", "Example");
    let runner = ScriptRunner::new(&InjectionConfig {
        poll_interval_ms: 20,
        max_poll_attempts: 5,
    });

    let start = Instant::now();
    let outcome = runner.run(page.as_ref(), "for (;;) {}").await;

    // Five checks, four sleeps between them.
    assert!(
        matches!(outcome, Err(RelayError::ExecutionTimeout { waited_ms }) if (80..90).contains(&waited_ms)),
        "{outcome:?}"
    );
    assert!(start.elapsed() < Duration::from_millis(90));
    assert!(leaked_slots(&page).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_slot_is_gone_after_each_outcome() {
    let page = page("https://example.com/", "Example");
    let injector = InlineInjector::default();

    for (exec_id, source) in [
        ("__tabrelay_ok", "let x = 1; x + 1"),
        ("__tabrelay_err", "throw new Error('nope')"),
        ("__tabrelay_hang", "while (true) {}"),
    ] {
        let program = InlineProgram::with_exec_id(exec_id.to_string(), source);
        let result = injector.inject_program(page.as_ref(), &program).await;
        match exec_id {
            "__tabrelay_ok" => assert_eq!(result, InlineResult::Completed("2".to_string())),
            "__tabrelay_err" => assert_eq!(result, InlineResult::Threw("nope".to_string())),
            _ => assert!(matches!(result, InlineResult::TimedOut { .. }), "{result:?}"),
        }
        for slot in program.slots.all() {
            assert!(!page.has_global(slot).await, "{slot} left behind");
        }
    }
    assert_eq!(page.element_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn injected_program_text_is_what_runs() {
    let page = page("https://example.com/", "Example");
    let injector = InlineInjector::new(&InjectionConfig {
        poll_interval_ms: 10,
        max_poll_attempts: 3,
    });

    let mut program = InlineProgram::new("let x = 1; x + 1");
    program.element.text = "this is not javascript )))".to_string();
    let result = injector.inject_program(page.as_ref(), &program).await;

    assert!(matches!(result, InlineResult::TimedOut { .. }), "{result:?}");
}
