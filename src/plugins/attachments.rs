//! Downloads file content for attachment items.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Plugin, PluginError};
use crate::sync::Session;

#[derive(Debug, Deserialize)]
struct AttachmentOptions {
    directory: PathBuf,
}

/// Built-in `attachments` plugin. Fetches the file content of every new or
/// changed attachment item through the session's write-once cache and
/// stores it under the item key.
pub struct AttachmentsPlugin;

#[async_trait]
impl Plugin for AttachmentsPlugin {
    fn name(&self) -> &str {
        "attachments"
    }

    async fn run(
        &self,
        session: &mut Session,
        options: &serde_json::Value,
    ) -> Result<(), PluginError> {
        let options: AttachmentOptions = serde_json::from_value(options.clone())
            .map_err(|e| PluginError::Options(e.to_string()))?;
        std::fs::create_dir_all(&options.directory)?;

        let keys: Vec<String> = session
            .updated
            .iter()
            .chain(session.created.iter())
            .filter(|key| {
                session
                    .items
                    .get(*key)
                    .is_some_and(|item| item.data.item_type.as_deref() == Some("attachment"))
            })
            .cloned()
            .collect();

        for key in &keys {
            let content = session
                .attachment(key)
                .await
                .map_err(|e| PluginError::Failed(e.to_string()))?;
            std::fs::write(options.directory.join(key), content)?;
        }

        tracing::info!(
            directory = %options.directory.display(),
            fetched = keys.len(),
            "attachments complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::api::{ApiClient, MockTransport, RawResponse, Transport};
    use crate::models::Subscription;

    #[tokio::test]
    async fn test_fetches_only_attachment_items() {
        let transport = Arc::new(MockTransport::new());
        transport.push(RawResponse {
            status: 200,
            content_type: Some("application/pdf".to_string()),
            body: vec![1, 2, 3],
            ..Default::default()
        });

        let client = Arc::new(ApiClient::new(transport.clone() as Arc<dyn Transport>));
        let mut session = Session::new(client, Subscription::new("/users/1"));
        session.created.push("FILE1".to_string());
        session.created.push("NOTE1".to_string());
        session.items.insert(
            "FILE1".to_string(),
            serde_json::from_value(serde_json::json!({
                "key": "FILE1", "version": 2, "data": {"itemType": "attachment"}
            }))
            .unwrap(),
        );
        session.items.insert(
            "NOTE1".to_string(),
            serde_json::from_value(serde_json::json!({
                "key": "NOTE1", "version": 2, "data": {"itemType": "note"}
            }))
            .unwrap(),
        );

        let dir = tempdir().unwrap();
        let options = serde_json::json!({"directory": dir.path()});
        AttachmentsPlugin.run(&mut session, &options).await.unwrap();

        assert!(dir.path().join("FILE1").exists());
        assert!(!dir.path().join("NOTE1").exists());
        assert_eq!(transport.requests().len(), 1);
        assert!(session.attachments.contains_key("FILE1"));
    }
}
