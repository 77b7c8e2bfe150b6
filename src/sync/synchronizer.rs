//! Drives sessions to completion and hands the results downstream.

use std::sync::Arc;

use chrono::Utc;

use crate::api::ApiClient;
use crate::db::SubscriptionStore;
use crate::models::Subscription;
use crate::plugins::PluginRegistry;

use super::error::SyncError;
use super::session::Session;

/// Orchestrates one session per invocation: create, execute with bounded
/// retry, dispatch plugins, persist the new version state.
pub struct Synchronizer {
    client: Arc<ApiClient>,
    store: Arc<dyn SubscriptionStore>,
    plugins: Arc<PluginRegistry>,
}

impl Synchronizer {
    pub fn new(
        client: Arc<ApiClient>,
        store: Arc<dyn SubscriptionStore>,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            client,
            store,
            plugins,
        }
    }

    /// Runs a full synchronization for the subscription and returns the
    /// completed session.
    ///
    /// When the session found new data, the plugin pipeline runs (unless
    /// `skip`), and the observed `(version, versions)` pair is persisted
    /// regardless of the dispatch outcome — a plugin failure must not hide
    /// that the remote data moved. The dispatch error still reaches the
    /// caller afterwards.
    pub async fn synchronize(
        &self,
        subscription: &mut Subscription,
        skip: bool,
    ) -> Result<Session, SyncError> {
        self.store.touch(&subscription.id).await?;
        subscription.touched_at = Some(Utc::now());

        let mut session = Session::new(self.client.clone(), subscription.clone());
        session.execute(skip).await?;

        if !session.modified() {
            tracing::debug!(subscription = %subscription.id, "unmodified");
            return Ok(session);
        }

        let dispatched = if skip {
            Ok(())
        } else {
            self.dispatch(&mut session).await
        };

        if let Some(version) = session.version {
            self.store
                .save_versions(&subscription.id, version, &session.versions)
                .await?;
            subscription.version = version;
            subscription.versions = session.versions.clone();
            tracing::info!(subscription = %subscription.id, version, "synchronized");
        }

        dispatched?;
        Ok(session)
    }

    /// Version-only probe: updates the diff state without downloading
    /// payloads or dispatching plugins.
    pub async fn update(&self, subscription: &mut Subscription) -> Result<Session, SyncError> {
        self.synchronize(subscription, true).await
    }

    /// Runs the subscription's plugin pipeline strictly sequentially, in
    /// list order. Unregistered names are skipped with a diagnostic; a
    /// failing plugin aborts the rest of the pipeline.
    async fn dispatch(&self, session: &mut Session) -> Result<(), SyncError> {
        let descriptors = session.subscription().plugins.clone();
        for descriptor in descriptors {
            let Some(plugin) = self.plugins.get(&descriptor.name) else {
                tracing::warn!(plugin = %descriptor.name, "plugin not registered, skipping");
                continue;
            };
            tracing::debug!(plugin = %descriptor.name, "dispatching");
            if let Err(source) = plugin.run(session, &descriptor.options).await {
                tracing::error!(
                    plugin = %descriptor.name,
                    error = %source,
                    detail = ?source,
                    "plugin failed, aborting pipeline"
                );
                return Err(SyncError::Plugin {
                    name: descriptor.name,
                    source,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::api::{MockTransport, RawResponse, Transport};
    use crate::db::MemoryStore;
    use crate::models::PluginDescriptor;
    use crate::plugins::{Plugin, PluginError};

    struct RecordingPlugin {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(
            &self,
            _session: &mut Session,
            _options: &serde_json::Value,
        ) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push(self.name.to_string());
            if self.fail {
                return Err(PluginError::Failed("boom".to_string()));
            }
            Ok(())
        }
    }

    fn versions_page(version: i64, entries: &[(&str, i64)]) -> RawResponse {
        let map: std::collections::BTreeMap<&str, i64> = entries.iter().cloned().collect();
        RawResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            last_modified_version: Some(version),
            total_results: Some(entries.len()),
            body: serde_json::to_vec(&map).unwrap(),
        }
    }

    fn items_page(version: i64, items: serde_json::Value) -> RawResponse {
        RawResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            last_modified_version: Some(version),
            total_results: Some(items.as_array().map(Vec::len).unwrap_or(0)),
            body: items.to_string().into_bytes(),
        }
    }

    async fn fixture(
        plugins: PluginRegistry,
    ) -> (Arc<MockTransport>, Arc<MemoryStore>, Synchronizer, Subscription) {
        let transport = Arc::new(MockTransport::new());
        let client = Arc::new(ApiClient::new(transport.clone() as Arc<dyn Transport>));
        let store = Arc::new(MemoryStore::new());
        let subscription = Subscription::new("/users/1");
        store.save(&subscription).await.unwrap();
        let synchronizer = Synchronizer::new(client, store.clone(), Arc::new(plugins));
        (transport, store, synchronizer, subscription)
    }

    #[tokio::test]
    async fn test_synchronize_dispatches_and_persists() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(RecordingPlugin {
            name: "first",
            calls: calls.clone(),
            fail: false,
        }));
        registry.register(Arc::new(RecordingPlugin {
            name: "second",
            calls: calls.clone(),
            fail: false,
        }));

        let (transport, store, synchronizer, mut subscription) = fixture(registry).await;
        subscription.plugins = vec![
            PluginDescriptor::new("first"),
            PluginDescriptor::new("second"),
        ];
        transport.push(versions_page(4, &[("a", 4)]));
        transport.push(items_page(4, serde_json::json!([{"key": "a", "version": 4}])));

        let session = synchronizer
            .synchronize(&mut subscription, false)
            .await
            .unwrap();
        assert!(session.modified());
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);

        let stored = store.load(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
        assert_eq!(stored.versions.get("a"), Some(&4));
        assert!(stored.touched_at.is_some());
        assert_eq!(subscription.version, 4);
    }

    #[tokio::test]
    async fn test_update_probe_skips_dispatch_but_persists() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(RecordingPlugin {
            name: "first",
            calls: calls.clone(),
            fail: false,
        }));

        let (transport, store, synchronizer, mut subscription) = fixture(registry).await;
        subscription.plugins = vec![PluginDescriptor::new("first")];
        transport.push(versions_page(4, &[("a", 4)]));

        let session = synchronizer.update(&mut subscription).await.unwrap();
        assert!(session.modified());
        assert!(session.items.is_empty());
        assert!(calls.lock().unwrap().is_empty());

        let stored = store.load(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn test_unmodified_neither_dispatches_nor_persists() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(RecordingPlugin {
            name: "first",
            calls: calls.clone(),
            fail: false,
        }));

        let (transport, store, synchronizer, mut subscription) = fixture(registry).await;
        subscription.plugins = vec![PluginDescriptor::new("first")];
        store.save_versions(&subscription.id, 9, &subscription.versions)
            .await
            .unwrap();
        subscription.version = 9;
        transport.push(RawResponse {
            status: 304,
            ..Default::default()
        });

        let session = synchronizer
            .synchronize(&mut subscription, false)
            .await
            .unwrap();
        assert!(!session.modified());
        assert!(calls.lock().unwrap().is_empty());

        let stored = store.load(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 9);
    }

    #[tokio::test]
    async fn test_plugin_failure_still_persists_and_propagates() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(RecordingPlugin {
            name: "failing",
            calls: calls.clone(),
            fail: true,
        }));
        registry.register(Arc::new(RecordingPlugin {
            name: "after",
            calls: calls.clone(),
            fail: false,
        }));

        let (transport, store, synchronizer, mut subscription) = fixture(registry).await;
        subscription.plugins = vec![
            PluginDescriptor::new("failing"),
            PluginDescriptor::new("after"),
        ];
        transport.push(versions_page(4, &[("a", 4)]));
        transport.push(items_page(4, serde_json::json!([{"key": "a", "version": 4}])));

        let result = synchronizer.synchronize(&mut subscription, false).await;
        assert!(matches!(result, Err(SyncError::Plugin { .. })));
        // Fail-fast: the second plugin never ran.
        assert_eq!(*calls.lock().unwrap(), vec!["failing"]);
        // The remote version still became durable.
        let stored = store.load(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_skipped_not_fatal() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(RecordingPlugin {
            name: "known",
            calls: calls.clone(),
            fail: false,
        }));

        let (transport, _store, synchronizer, mut subscription) = fixture(registry).await;
        subscription.plugins = vec![
            PluginDescriptor::new("missing"),
            PluginDescriptor::new("known"),
        ];
        transport.push(versions_page(4, &[("a", 4)]));
        transport.push(items_page(4, serde_json::json!([{"key": "a", "version": 4}])));

        synchronizer
            .synchronize(&mut subscription, false)
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["known"]);
    }
}
