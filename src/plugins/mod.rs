//! Plugin pipeline for completed sessions.
//!
//! Plugins consume a session's diff sets and item cache. Completion is
//! signaled through the returned `Result` — success or a typed failure;
//! there is no secondary callback protocol.

mod attachments;
mod export;

pub use attachments::AttachmentsPlugin;
pub use export::ExportPlugin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::Session;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid plugin options: {0}")]
    Options(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name under which subscriptions address this plugin.
    fn name(&self) -> &str;

    async fn run(
        &self,
        session: &mut Session,
        options: &serde_json::Value,
    ) -> Result<(), PluginError>;
}

/// Registry of plugins addressable from subscription descriptors.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExportPlugin));
        registry.register(Arc::new(AttachmentsPlugin));
        registry
    }

    /// Registers a plugin under its own name; a later registration with the
    /// same name replaces the earlier one.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }
}
