//! Writes downloaded item payloads to a directory, one JSON file per key.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Plugin, PluginError};
use crate::sync::Session;

#[derive(Debug, Deserialize)]
struct ExportOptions {
    directory: PathBuf,
    /// Pretty-print the JSON payloads.
    #[serde(default)]
    pretty: bool,
}

/// Built-in `export` plugin. New and changed items are written as
/// `<key>.json`; files for deleted keys are removed.
pub struct ExportPlugin;

#[async_trait]
impl Plugin for ExportPlugin {
    fn name(&self) -> &str {
        "export"
    }

    async fn run(
        &self,
        session: &mut Session,
        options: &serde_json::Value,
    ) -> Result<(), PluginError> {
        let options: ExportOptions = serde_json::from_value(options.clone())
            .map_err(|e| PluginError::Options(e.to_string()))?;
        std::fs::create_dir_all(&options.directory)?;

        let mut written = 0;
        for key in session.updated.iter().chain(session.created.iter()) {
            let Some(item) = session.items.get(key) else {
                continue;
            };
            let body = if options.pretty {
                serde_json::to_vec_pretty(item)
            } else {
                serde_json::to_vec(item)
            }
            .map_err(|e| PluginError::Failed(e.to_string()))?;
            std::fs::write(options.directory.join(format!("{}.json", key)), body)?;
            written += 1;
        }

        let mut removed = 0;
        for key in &session.deleted {
            let path = options.directory.join(format!("{}.json", key));
            if path.exists() {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }

        tracing::info!(
            directory = %options.directory.display(),
            written,
            removed,
            "export complete"
        );
        Ok(())
    }
}
