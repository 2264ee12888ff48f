//! End-to-end relay behavior: sender → service → host → responder → page.

use crate::integration::test_utils::{leaked_slots, page, Harness};
use serde_json::json;
use std::time::Duration;
use tabrelay::transport::ReadinessAnnouncer;
use tabrelay::types::{ACTION_EXECUTE_SCRIPT, ACTION_PING};
use tabrelay::{Command, ContextId, ErrorKind, ExecutionOutcome, RelayError};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn document_title_takes_structured_path() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example Domain");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness.sender.run_script(Some(ContextId(1)), "document.title").await;

    assert_eq!(outcome, ExecutionOutcome::completed("Example Domain"));
    assert_eq!(page.structured_calls(), 1);
    assert_eq!(page.inline_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn statements_run_inline_and_return_last_value() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness.sender.run_script(Some(ContextId(1)), "let x = 1; x + 1").await;

    assert_eq!(outcome, ExecutionOutcome::completed("2"));
    assert_eq!(page.structured_calls(), 0);
    assert_eq!(page.inline_calls(), 1);
    assert!(leaked_slots(&page).await.is_empty());
    assert_eq!(page.element_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn misclassified_expression_falls_back_silently() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    // Rooted at a known global, but two lines only parse as a program body.
    let source = "console.log('warming up')\nMath.max(3, 7)";
    let outcome = harness.sender.run_script(Some(ContextId(1)), source).await;

    assert_eq!(outcome, ExecutionOutcome::completed("7"));
    assert_eq!(page.structured_calls(), 1);
    assert_eq!(page.inline_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn blocked_structured_primitive_still_yields_result() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Strict Page");
    page.block_structured(true);
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness.sender.run_script(Some(ContextId(1)), "document.title").await;

    assert_eq!(outcome, ExecutionOutcome::completed("Strict Page"));
    assert_eq!(page.inline_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn never_ready_target_exhausts_budget_then_reports_not_ready() {
    let harness = Harness::new();
    // A tab with no content script: every send and probe fails as not-ready.
    harness.host.open_tab(ContextId(2));

    let start = Instant::now();
    let outcome = harness.sender.run_script(Some(ContextId(2)), "document.title").await;
    let elapsed = start.elapsed();

    assert!(!outcome.success);
    let error = outcome.error.unwrap_or_default();
    assert!(error.contains("Try refreshing the page"), "{error}");
    assert_eq!(harness.transport.count(ContextId(2), ACTION_EXECUTE_SCRIPT), 3);
    assert_eq!(harness.transport.count(ContextId(2), ACTION_PING), 6);
    // 500 + 1000 ms of sender backoff plus one 100 ms probe delay per forward.
    assert!(elapsed >= Duration::from_millis(1500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(2000), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn infinite_loop_times_out_and_cleans_up() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness.sender.run_script(Some(ContextId(1)), "while (true) {}").await;

    assert!(!outcome.success);
    let error = outcome.error.unwrap_or_default();
    assert!(error.contains("timed out"), "{error}");
    // Timeouts are never re-run.
    assert_eq!(page.inline_calls(), 1);
    assert!(leaked_slots(&page).await.is_empty());
    assert_eq!(page.element_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn thrown_error_is_reported_and_slots_removed() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness
        .sender
        .run_script(Some(ContextId(1)), "throw new Error('boom')")
        .await;

    assert_eq!(outcome, ExecutionOutcome::failed("boom"));
    assert_eq!(page.element_count(), 0);
    assert!(leaked_slots(&page).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_script_completes_within_poll_ceiling() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    page.set_script_latency(Duration::from_millis(50));
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let start = Instant::now();
    let outcome = harness
        .sender
        .run_script(Some(ContextId(1)), "let label = 'late'; label")
        .await;

    assert_eq!(outcome, ExecutionOutcome::completed("late"));
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(leaked_slots(&page).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn page_state_persists_between_commands() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;
    let target = Some(ContextId(1));

    let first = harness
        .sender
        .run_script(target, "window.visits = (window.visits || 0) + 1; document.title = 'Visited'")
        .await;
    assert_eq!(first, ExecutionOutcome::completed("Visited"));

    assert_eq!(
        harness.sender.run_script(target, "window.visits").await,
        ExecutionOutcome::completed("1")
    );
    assert_eq!(
        harness.sender.run_script(target, "document.title").await,
        ExecutionOutcome::completed("Visited")
    );
    assert!(leaked_slots(&page).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reloaded_context_recovers_once_new_instance_announces() {
    let harness = Harness::new();
    let first = page("https://example.com/", "Before");
    harness.open_page(1, &first);
    harness.wait_ready(1).await;
    assert_eq!(
        harness.sender.run_script(Some(ContextId(1)), "document.title").await,
        ExecutionOutcome::completed("Before")
    );

    // Same id, new instance; the new content script loads 700 ms later.
    harness.host.reload(ContextId(1));
    let second = page("https://example.com/next", "After");
    let responder = harness.responder(1, &second);
    let host = harness.host.clone();
    let announcer = harness.handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        host.attach(ContextId(1), std::sync::Arc::new(responder), std::sync::Arc::new(announcer))
            .unwrap();
    });

    let start = Instant::now();
    let outcome = harness.sender.run_script(Some(ContextId(1)), "document.title").await;

    assert_eq!(outcome, ExecutionOutcome::completed("After"));
    assert!(start.elapsed() >= Duration::from_millis(700));
    assert!(harness.coordinator.tracker().is_ready(ContextId(1)));
}

#[tokio::test(start_paused = true)]
async fn closed_tab_is_unreachable_and_not_retried() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(3, &page);
    harness.wait_ready(3).await;

    harness.host.close(ContextId(3));
    let outcome = harness
        .sender
        .send(Some(ContextId(3)), ACTION_EXECUTE_SCRIPT, json!({ "code": "1" }), Some(3))
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::Unreachable));
    assert_eq!(harness.transport.count(ContextId(3), ACTION_EXECUTE_SCRIPT), 1);
    assert_eq!(harness.transport.count(ContextId(3), ACTION_PING), 0);
    assert!(!harness.coordinator.tracker().is_ready(ContextId(3)));
}

#[tokio::test(start_paused = true)]
async fn missing_target_is_terminal() {
    let harness = Harness::new();
    let outcome = harness.sender.run_script(None, "document.title").await;
    assert_eq!(
        outcome,
        ExecutionOutcome::failed(RelayError::NoTarget.to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_action_fails_once() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness
        .sender
        .send(Some(ContextId(1)), "frobnicate", json!({}), None)
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownAction));
    assert_eq!(outcome.error.as_deref(), Some("Unknown action: frobnicate"));
    assert_eq!(harness.transport.count(ContextId(1), "frobnicate"), 1);
}

#[tokio::test(start_paused = true)]
async fn announcing_twice_keeps_one_record_and_forget_then_probe_is_not_ready() {
    let harness = Harness::new();
    harness.host.open_tab(ContextId(5));

    harness.handle.announce_ready(ContextId(5)).await.unwrap();
    harness.handle.announce_ready(ContextId(5)).await.unwrap();
    assert_eq!(harness.coordinator.tracker().snapshot(), vec![ContextId(5)]);

    harness.coordinator.forget(ContextId(5));
    harness.coordinator.forget(ContextId(5));
    let err = harness
        .coordinator
        .forward(Some(ContextId(5)), &Command::ping())
        .await
        .unwrap_err();
    assert_eq!(err, RelayError::NotReady { context: ContextId(5) });
}

#[tokio::test(start_paused = true)]
async fn stopped_service_invalidates_channel() {
    let mut harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    harness.service.abort();
    let _ = (&mut harness.service).await;
    assert!(harness.handle.is_closed());
    let start = Instant::now();
    let outcome = harness.sender.run_script(Some(ContextId(1)), "document.title").await;

    assert!(!outcome.success);
    assert!(outcome
        .error
        .unwrap_or_default()
        .contains("Extension context invalidated"));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn commands_to_different_contexts_run_concurrently() {
    let harness = Harness::new();
    let slow = page("https://slow.example/", "Slow");
    slow.set_script_latency(Duration::from_millis(500));
    let fast = page("https://fast.example/", "Fast");
    harness.open_page(1, &slow);
    harness.open_page(2, &fast);
    harness.wait_ready(1).await;
    harness.wait_ready(2).await;

    let start = Instant::now();
    let (slow_outcome, fast_outcome) = tokio::join!(
        harness.sender.run_script(Some(ContextId(1)), "let speed = 'slow'; speed"),
        async {
            let outcome = harness.sender.run_script(Some(ContextId(2)), "document.title").await;
            (outcome, start.elapsed())
        }
    );

    assert_eq!(slow_outcome, ExecutionOutcome::completed("slow"));
    assert_eq!(fast_outcome.0, ExecutionOutcome::completed("Fast"));
    assert!(fast_outcome.1 < Duration::from_millis(100), "{:?}", fast_outcome.1);
}

#[tokio::test(start_paused = true)]
async fn many_contexts_answer_independently() {
    let harness = Harness::new();
    let pages: Vec<_> = (1..=8)
        .map(|id| {
            let page = page(&format!("https://example.com/{id}"), &format!("Tab {id}"));
            harness.open_page(id, &page);
            page
        })
        .collect();
    for id in 1..=8 {
        harness.wait_ready(id).await;
    }

    let outcomes = futures::future::join_all(
        (1..=8).map(|id| harness.sender.run_script(Some(ContextId(id)), "document.title")),
    )
    .await;

    for (index, outcome) in outcomes.into_iter().enumerate() {
        assert_eq!(outcome, ExecutionOutcome::completed(format!("Tab {}", index + 1)));
    }
    assert!(pages.iter().all(|page| page.structured_calls() == 1));
    assert_eq!(harness.coordinator.tracker().len(), 8);
}
