//! The remote page as seen by injection code.
//!
//! A [`PageRealm`] is the page's own execution environment: its global object, its
//! document, and its storage areas. Injection strategies only talk to the page through
//! this trait.

use crate::script::value::RemoteValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why the page refused or failed an injection primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionFailure {
    /// The injected code ran and threw.
    #[error("{0}")]
    Threw(String),
    /// The page refused to run it (content-restriction policy, missing permission).
    #[error("injection blocked: {0}")]
    Blocked(String),
    /// The document is gone (navigated, closed).
    #[error("page detached")]
    Detached,
}

/// An executable element to attach to the page's document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptElement {
    /// DOM id of the element, used to remove it afterwards
    pub element_id: String,
    /// Single-use id whose slots the program writes
    pub exec_id: String,
    /// Program text placed in the element
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    Local,
    Session,
}

impl std::str::FromStr for StorageArea {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" | "localStorage" => Ok(StorageArea::Local),
            "session" | "sessionStorage" => Ok(StorageArea::Session),
            other => Err(format!("unknown storage area '{}'", other)),
        }
    }
}

/// A storage mutation observed by the page's storage monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageChange {
    pub area: StorageArea,
    /// `None` when the whole area was cleared
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

#[async_trait]
pub trait PageRealm: Send + Sync {
    /// Run `function_source` with `argument` through the privileged, parameter-passing
    /// injection primitive and return its result.
    async fn call_function(
        &self,
        function_source: &str,
        argument: &str,
    ) -> Result<RemoteValue, InjectionFailure>;

    /// Attach an executable element so the page's own engine runs its text.
    async fn append_script(&self, element: &ScriptElement) -> Result<(), InjectionFailure>;

    /// Remove a previously attached element. Returns whether it was present.
    async fn remove_element(&self, element_id: &str) -> bool;

    /// `window[name]`, `Undefined` when absent.
    async fn read_global(&self, name: &str) -> RemoteValue;

    /// `delete window[name]`.
    async fn delete_global(&self, name: &str);

    /// `name in window`.
    async fn has_global(&self, name: &str) -> bool;

    async fn page_info(&self) -> PageInfo;

    async fn storage_items(&self, area: StorageArea) -> BTreeMap<String, String>;

    async fn set_storage_item(&self, area: StorageArea, key: &str, value: &str);

    async fn remove_storage_item(&self, area: StorageArea, key: &str);

    async fn clear_storage(&self, area: StorageArea);

    /// Install the storage-change monitor. Changes arrive on the returned channel;
    /// `None` if the page cannot be instrumented.
    async fn watch_storage(&self) -> Option<tokio::sync::mpsc::UnboundedReceiver<StorageChange>>;
}
