use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A plugin to run against a completed session, with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: serde_json::Value::Null,
        }
    }
}

/// A locally registered mirror of one remote library collection.
///
/// `version` and `versions` track the last fully synchronized remote state;
/// they only move forward when a run completes and persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Remote library path, e.g. `/users/475425` or `/groups/12`. Also the
    /// streaming topic for this subscription.
    pub library: String,
    /// Optional sub-path under the library; defaults to `/items`.
    #[serde(default)]
    pub path: Option<String>,
    /// Extra query parameters sent with every API request.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Extra headers sent with every API request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// API credential, shared by the HTTP API and the streaming channel.
    #[serde(default)]
    pub key: Option<String>,
    /// Last fully synchronized library version.
    #[serde(default)]
    pub version: i64,
    /// Last known item key -> version state.
    #[serde(default)]
    pub versions: BTreeMap<String, i64>,
    #[serde(default)]
    pub plugins: Vec<PluginDescriptor>,
    /// When a synchronizer last visited this subscription, modified or not.
    #[serde(default)]
    pub touched_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            library: library.into(),
            path: None,
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            key: None,
            version: 0,
            versions: BTreeMap::new(),
            plugins: Vec::new(),
            touched_at: None,
        }
    }

    /// Path of the item collection this subscription mirrors.
    pub fn items_path(&self) -> String {
        match &self.path {
            Some(path) => format!("{}{}", self.library, path),
            None => format!("{}/items", self.library),
        }
    }

    /// Topic under which the streaming channel multiplexes this library.
    pub fn topic(&self) -> &str {
        &self.library
    }
}
