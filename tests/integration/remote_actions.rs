//! Non-script actions and startup behavior of a remote context, driven through the relay.

use crate::integration::test_utils::{page, Harness};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tabrelay::pending::{MemoryPendingScriptStore, PendingScript, PendingScriptStore, PendingSlot};
use tabrelay::script::{PageRealm, RemoteValue};
use tabrelay::types::{
    ACTION_CLEAR_STORAGE, ACTION_EXECUTE_SCRIPT, ACTION_GET_PAGE_INFO, ACTION_GET_STORAGE,
    ACTION_GET_STORAGE_CHANGES, ACTION_REMOVE_STORAGE, ACTION_SET_STORAGE,
};
use tabrelay::{ContextId, ErrorKind};

/// Sleep in small steps until `done` holds; time is paused, so sleeping lets timers fire.
async fn eventually(done: impl Fn() -> bool) {
    let wait = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("condition never held");
}

#[tokio::test(start_paused = true)]
async fn page_info_reports_url_and_title() {
    let harness = Harness::new();
    let page = page("https://example.com/docs", "Docs");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness
        .sender
        .send(Some(ContextId(1)), ACTION_GET_PAGE_INFO, json!({}), None)
        .await;

    assert!(outcome.success);
    assert_eq!(
        outcome.result,
        Some(json!({ "url": "https://example.com/docs", "title": "Docs" }))
    );
}

#[tokio::test(start_paused = true)]
async fn storage_round_trip_and_change_log() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    let responder = Arc::new(harness.responder(1, &page));
    harness.host.open_tab(ContextId(1));
    harness
        .host
        .attach(ContextId(1), Arc::clone(&responder), Arc::new(harness.handle.clone()))
        .unwrap();
    harness.wait_ready(1).await;
    let target = Some(ContextId(1));

    let set = harness
        .sender
        .send(
            target,
            ACTION_SET_STORAGE,
            json!({ "area": "local", "key": "theme", "value": "dark" }),
            None,
        )
        .await;
    assert_eq!(set.result, Some(json!(true)));

    let items = harness
        .sender
        .send(target, ACTION_GET_STORAGE, json!({ "area": "localStorage" }), None)
        .await;
    assert_eq!(items.result, Some(json!({ "theme": "dark" })));

    harness
        .sender
        .send(target, ACTION_REMOVE_STORAGE, json!({ "area": "local", "key": "theme" }), None)
        .await;
    harness
        .sender
        .send(target, ACTION_CLEAR_STORAGE, json!({ "area": "session" }), None)
        .await;
    let empty = harness
        .sender
        .send(target, ACTION_GET_STORAGE, json!({ "area": "local" }), None)
        .await;
    assert_eq!(empty.result, Some(json!({})));

    eventually(|| responder.storage_changes().len() >= 3).await;
    let changes = harness
        .sender
        .send(target, ACTION_GET_STORAGE_CHANGES, json!({}), None)
        .await;
    let changes = changes.result.unwrap();
    let changes = changes.as_array().unwrap();
    assert_eq!(changes.len(), 3);
    assert_eq!(changes[0]["area"], "local");
    assert_eq!(changes[0]["key"], "theme");
    assert_eq!(changes[0]["new_value"], "dark");
    assert_eq!(changes[1]["old_value"], "dark");
    assert!(changes[1]["new_value"].is_null());
    assert_eq!(changes[2]["area"], "session");
    assert!(changes[2]["key"].is_null());

    // Reading drains the log.
    assert!(responder.storage_changes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_fails_without_retry() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    harness.open_page(1, &page);
    harness.wait_ready(1).await;

    let outcome = harness
        .sender
        .send(Some(ContextId(1)), ACTION_SET_STORAGE, json!({ "area": "cookies" }), None)
        .await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("unknown storage area 'cookies'"));

    let outcome = harness
        .sender
        .send(Some(ContextId(1)), ACTION_EXECUTE_SCRIPT, json!({ "code": "  " }), None)
        .await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownAction));
    assert_eq!(harness.transport.count(ContextId(1), ACTION_EXECUTE_SCRIPT), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_script_runs_once_at_startup() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    let store = Arc::new(MemoryPendingScriptStore::new());
    store.stash("window.startedOn = document.title; startedOn").unwrap();

    harness.host.open_tab(ContextId(1));
    harness.load_with_pending(
        1,
        &page,
        PendingSlot::new(store.clone(), Duration::from_secs(300)),
    );
    harness.wait_ready(1).await;

    eventually(|| page.inline_calls() == 1).await;
    assert!(store.take().unwrap().is_none());
    assert_eq!(page.read_global("startedOn").await, RemoteValue::string("Example"));

    // A later load of the same page finds nothing to run.
    harness.host.reload(ContextId(1));
    harness.load_with_pending(
        1,
        &page,
        PendingSlot::new(store.clone(), Duration::from_secs(300)),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(page.inline_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_pending_script_is_dropped() {
    let harness = Harness::new();
    let page = page("https://example.com/", "Example");
    let store = Arc::new(MemoryPendingScriptStore::new());
    let mut script = PendingScript::new("let x = 1; x + 1");
    script.stashed_at = script.stashed_at - chrono::Duration::minutes(10);
    store.put(script).unwrap();

    harness.host.open_tab(ContextId(1));
    harness.load_with_pending(
        1,
        &page,
        PendingSlot::new(store.clone(), Duration::from_secs(300)),
    );
    harness.wait_ready(1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(page.inline_calls(), 0);
    assert!(store.take().unwrap().is_none());
}
