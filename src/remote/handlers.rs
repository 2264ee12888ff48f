//! Named action handlers for a ready remote context.

use crate::error::RelayError;
use crate::remote::monitor::StorageChangeLog;
use crate::script::realm::{PageRealm, StorageArea};
use crate::script::runner::ScriptRunner;
use crate::types::{
    ACTION_CLEAR_STORAGE, ACTION_EXECUTE_SCRIPT, ACTION_GET_PAGE_INFO, ACTION_GET_STORAGE,
    ACTION_GET_STORAGE_CHANGES, ACTION_REMOVE_STORAGE, ACTION_SET_STORAGE,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> Result<Value, RelayError>;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in action over `realm`.
    pub fn builtin(
        realm: Arc<dyn PageRealm>,
        runner: Arc<ScriptRunner>,
        changes: Arc<StorageChangeLog>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(
            ACTION_EXECUTE_SCRIPT,
            Arc::new(ExecuteScript {
                realm: Arc::clone(&realm),
                runner,
            }),
        );
        registry.register(ACTION_GET_PAGE_INFO, Arc::new(GetPageInfo(Arc::clone(&realm))));
        registry.register(ACTION_GET_STORAGE, Arc::new(GetStorage(Arc::clone(&realm))));
        registry.register(ACTION_SET_STORAGE, Arc::new(SetStorage(Arc::clone(&realm))));
        registry.register(ACTION_REMOVE_STORAGE, Arc::new(RemoveStorage(Arc::clone(&realm))));
        registry.register(ACTION_CLEAR_STORAGE, Arc::new(ClearStorage(realm)));
        registry.register(ACTION_GET_STORAGE_CHANGES, Arc::new(GetStorageChanges(changes)));
        registry
    }

    /// Register `handler` for `action`, replacing any previous one.
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action.into(), handler);
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }
}

fn required_str<'a>(payload: &'a Value, action: &str, field: &str) -> Result<&'a str, RelayError> {
    payload.get(field).and_then(Value::as_str).ok_or_else(|| {
        RelayError::InvalidPayload(format!("{} requires a string '{}' field", action, field))
    })
}

fn storage_area(payload: &Value, action: &str) -> Result<StorageArea, RelayError> {
    required_str(payload, action, "area")?
        .parse()
        .map_err(|e: String| RelayError::InvalidPayload(format!("{}: {}", action, e)))
}

struct ExecuteScript {
    realm: Arc<dyn PageRealm>,
    runner: Arc<ScriptRunner>,
}

#[async_trait]
impl ActionHandler for ExecuteScript {
    async fn handle(&self, payload: &Value) -> Result<Value, RelayError> {
        let code = required_str(payload, ACTION_EXECUTE_SCRIPT, "code")?;
        if code.trim().is_empty() {
            return Err(RelayError::InvalidPayload(
                "executeScript requires non-empty code".to_string(),
            ));
        }
        let result = self.runner.run(self.realm.as_ref(), code).await?;
        Ok(Value::String(result))
    }
}

struct GetPageInfo(Arc<dyn PageRealm>);

#[async_trait]
impl ActionHandler for GetPageInfo {
    async fn handle(&self, _payload: &Value) -> Result<Value, RelayError> {
        let info = self.0.page_info().await;
        Ok(json!({ "url": info.url, "title": info.title }))
    }
}

struct GetStorage(Arc<dyn PageRealm>);

#[async_trait]
impl ActionHandler for GetStorage {
    async fn handle(&self, payload: &Value) -> Result<Value, RelayError> {
        let area = storage_area(payload, ACTION_GET_STORAGE)?;
        let items: Map<String, Value> = self
            .0
            .storage_items(area)
            .await
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        Ok(Value::Object(items))
    }
}

struct SetStorage(Arc<dyn PageRealm>);

#[async_trait]
impl ActionHandler for SetStorage {
    async fn handle(&self, payload: &Value) -> Result<Value, RelayError> {
        let area = storage_area(payload, ACTION_SET_STORAGE)?;
        let key = required_str(payload, ACTION_SET_STORAGE, "key")?;
        let value = required_str(payload, ACTION_SET_STORAGE, "value")?;
        self.0.set_storage_item(area, key, value).await;
        Ok(json!(true))
    }
}

struct RemoveStorage(Arc<dyn PageRealm>);

#[async_trait]
impl ActionHandler for RemoveStorage {
    async fn handle(&self, payload: &Value) -> Result<Value, RelayError> {
        let area = storage_area(payload, ACTION_REMOVE_STORAGE)?;
        let key = required_str(payload, ACTION_REMOVE_STORAGE, "key")?;
        self.0.remove_storage_item(area, key).await;
        Ok(json!(true))
    }
}

struct ClearStorage(Arc<dyn PageRealm>);

#[async_trait]
impl ActionHandler for ClearStorage {
    async fn handle(&self, payload: &Value) -> Result<Value, RelayError> {
        let area = storage_area(payload, ACTION_CLEAR_STORAGE)?;
        self.0.clear_storage(area).await;
        Ok(json!(true))
    }
}

struct GetStorageChanges(Arc<StorageChangeLog>);

#[async_trait]
impl ActionHandler for GetStorageChanges {
    async fn handle(&self, _payload: &Value) -> Result<Value, RelayError> {
        serde_json::to_value(self.0.drain())
            .map_err(|e| RelayError::Execution(format!("Failed to encode storage changes: {}", e)))
    }
}
