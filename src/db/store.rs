use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::models::Subscription;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt column {column} for subscription {id}: {detail}")]
    Corrupt {
        id: String,
        column: String,
        detail: String,
    },
}

/// Persistence contract for subscriptions.
///
/// The sync core only ever calls `save_versions` (after a completed run)
/// and `touch` (before a run starts); the rest serves the CLI.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Subscription>, StoreError>;

    async fn list(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Pages through subscriptions ordered by id.
    async fn list_range(&self, offset: i64, limit: i64) -> Result<Vec<Subscription>, StoreError>;

    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Makes a completed run's version state durable.
    async fn save_versions(
        &self,
        id: &str,
        version: i64,
        versions: &BTreeMap<String, i64>,
    ) -> Result<(), StoreError>;

    /// Stamps the subscription as recently visited.
    async fn touch(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn load(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self.subscriptions.lock().unwrap().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let mut subscriptions: Vec<Subscription> =
            self.subscriptions.lock().unwrap().values().cloned().collect();
        subscriptions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(subscriptions)
    }

    async fn list_range(&self, offset: i64, limit: i64) -> Result<Vec<Subscription>, StoreError> {
        let all = self.list().await?;
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.subscriptions
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_versions(
        &self,
        id: &str,
        version: i64,
        versions: &BTreeMap<String, i64>,
    ) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        subscription.version = version;
        subscription.versions = versions.clone();
        Ok(())
    }

    async fn touch(&self, id: &str) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        subscription.touched_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let subscription = Subscription::new("/users/1");
        store.save(&subscription).await.unwrap();

        let loaded = store.load(&subscription.id).await.unwrap().unwrap();
        assert_eq!(loaded, subscription);

        store
            .save_versions(
                &subscription.id,
                7,
                &[("a".to_string(), 7)].into_iter().collect(),
            )
            .await
            .unwrap();
        let loaded = store.load(&subscription.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 7);

        store.touch(&subscription.id).await.unwrap();
        assert!(store
            .load(&subscription.id)
            .await
            .unwrap()
            .unwrap()
            .touched_at
            .is_some());

        store.remove(&subscription.id).await.unwrap();
        assert!(store.load(&subscription.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.touch("missing").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.remove("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
