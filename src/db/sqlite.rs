use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::store::{StoreError, SubscriptionStore};
use crate::models::{PluginDescriptor, Subscription};

/// SQLite-backed subscription store.
///
/// Structured columns (`params`, `headers`, `versions`, `plugins`) are
/// stored as JSON text; timestamps as RFC 3339 strings.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    library: String,
    path: Option<String>,
    params: String,
    headers: String,
    api_key: Option<String>,
    version: i64,
    versions: String,
    plugins: String,
    touched_at: Option<String>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription, StoreError> {
        let params: BTreeMap<String, String> = decode_column(&self.id, "params", &self.params)?;
        let headers: BTreeMap<String, String> = decode_column(&self.id, "headers", &self.headers)?;
        let versions: BTreeMap<String, i64> = decode_column(&self.id, "versions", &self.versions)?;
        let plugins: Vec<PluginDescriptor> = decode_column(&self.id, "plugins", &self.plugins)?;
        let touched_at = match self.touched_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|timestamp| timestamp.with_timezone(&Utc))
                    .map_err(|e| StoreError::Corrupt {
                        id: self.id.clone(),
                        column: "touched_at".to_string(),
                        detail: e.to_string(),
                    })?,
            ),
            None => None,
        };

        Ok(Subscription {
            id: self.id,
            library: self.library,
            path: self.path,
            params,
            headers,
            key: self.api_key,
            version: self.version,
            versions,
            plugins,
            touched_at,
        })
    }
}

fn decode_column<T: serde::de::DeserializeOwned>(
    id: &str,
    column: &str,
    raw: &str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        column: column.to_string(),
        detail: e.to_string(),
    })
}

fn encode_column<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn load(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(SubscriptionRow::into_subscription).transpose()
    }

    async fn list(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }

    async fn list_range(&self, offset: i64, limit: i64) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions ORDER BY id LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, library, path, params, headers, api_key, version, versions, plugins, touched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                library = excluded.library,
                path = excluded.path,
                params = excluded.params,
                headers = excluded.headers,
                api_key = excluded.api_key,
                version = excluded.version,
                versions = excluded.versions,
                plugins = excluded.plugins,
                touched_at = excluded.touched_at
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.library)
        .bind(&subscription.path)
        .bind(encode_column(&subscription.params))
        .bind(encode_column(&subscription.headers))
        .bind(&subscription.key)
        .bind(subscription.version)
        .bind(encode_column(&subscription.versions))
        .bind(encode_column(&subscription.plugins))
        .bind(subscription.touched_at.map(|timestamp| timestamp.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn save_versions(
        &self,
        id: &str,
        version: i64,
        versions: &BTreeMap<String, i64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET version = ?, versions = ? WHERE id = ?")
            .bind(version)
            .bind(encode_column(versions))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn touch(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET touched_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
