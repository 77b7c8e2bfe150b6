//! State of one synchronization run for one subscription.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::api::ApiClient;
use crate::models::{Item, Subscription};

use super::error::SyncError;

/// Keys per download batch; keeps request URLs under the server's size cap.
pub const DOWNLOAD_BATCH_LIMIT: usize = 50;

/// Retry budget for runs interrupted by remote version changes.
pub const DEFAULT_RETRIES: u32 = 3;

/// An ephemeral synchronization run, owned by one synchronizer invocation
/// and discarded afterwards.
///
/// `items` and `attachments` are monotonic caches: once populated, an entry
/// is only overwritten when the remote version for its key changed. They
/// survive retries within the same run so interrupted work is not repeated.
pub struct Session {
    client: Arc<ApiClient>,
    subscription: Subscription,
    /// Remote library version observed this run; `None` until the first
    /// successful manifest fetch, and after an unmodified short-circuit.
    pub version: Option<i64>,
    /// Remote key -> version manifest accumulated this run.
    pub versions: BTreeMap<String, i64>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    /// Downloaded payloads, keyed by item key.
    pub items: HashMap<String, Item>,
    /// Cached binary file responses, write-once per key for the life of the
    /// run.
    pub attachments: HashMap<String, Vec<u8>>,
}

impl Session {
    pub fn new(client: Arc<ApiClient>, subscription: Subscription) -> Self {
        Self {
            client,
            subscription,
            version: None,
            versions: BTreeMap::new(),
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            items: HashMap::new(),
            attachments: HashMap::new(),
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// True once this run observed a remote version strictly beyond the
    /// subscription's last synchronized one.
    pub fn modified(&self) -> bool {
        self.version
            .is_some_and(|version| version > self.subscription.version)
    }

    /// Guards a paginated or batched response against the remote collection
    /// changing mid-run. Before any version was observed, every value
    /// passes; afterwards a mismatch interrupts the run.
    fn check(&self, version: i64) -> Result<(), SyncError> {
        match self.version {
            Some(observed) if observed != version => {
                tracing::warn!(
                    subscription = %self.subscription.id,
                    observed,
                    reported = version,
                    "remote version changed mid-run"
                );
                Err(SyncError::interrupted())
            }
            _ => Ok(()),
        }
    }

    /// Fetches the remote version manifest and recomputes the diff.
    ///
    /// An unmodified short-circuit from the server ends the run with
    /// `version` unset. Continuation pages are validated against the first
    /// observed version before merging; pages merged before an interruption
    /// are kept for the retry.
    pub async fn update(&mut self) -> Result<(), SyncError> {
        let mut page = self.client.versions(&self.subscription).await?;
        if page.unmodified {
            self.version = None;
            return Ok(());
        }

        self.version = Some(page.version);
        self.versions.append(&mut page.data);
        while !page.done() {
            page = self.client.next_page(&page).await?;
            self.check(page.version)?;
            self.versions.append(&mut page.data);
        }

        self.diff();
        tracing::debug!(
            subscription = %self.subscription.id,
            version = ?self.version,
            created = self.created.len(),
            updated = self.updated.len(),
            deleted = self.deleted.len(),
            "manifest fetched"
        );
        Ok(())
    }

    /// Recomputes `created`/`updated`/`deleted` against the subscription's
    /// last known state. The three sequences are cleared and fully rebuilt;
    /// calling this twice with the same inputs yields identical output.
    pub fn diff(&mut self) {
        self.created.clear();
        self.updated.clear();
        self.deleted.clear();

        let earlier = &self.subscription.versions;
        for (key, &version) in &self.versions {
            match earlier.get(key) {
                None => self.created.push(key.clone()),
                Some(&previous) if version > previous => self.updated.push(key.clone()),
                _ => {}
            }
        }
        for key in earlier.keys() {
            if !self.versions.contains_key(key) {
                self.deleted.push(key.clone());
            }
        }
    }

    /// Downloads payloads for every key the diff flagged as updated or
    /// created, in that order.
    pub async fn download(&mut self) -> Result<(), SyncError> {
        let keys: Vec<String> = self
            .updated
            .iter()
            .chain(self.created.iter())
            .cloned()
            .collect();
        self.download_keys(keys).await
    }

    /// Downloads payloads for an explicit worklist of keys.
    ///
    /// The worklist grows while it is scanned: when a payload references a
    /// parent item not yet listed, the parent key is appended and fetched in
    /// a later batch of the same call. Keys whose cached payload already
    /// matches the manifest version are skipped. Items reporting children
    /// are followed immediately; the child collection lands both inline on
    /// the parent and flattened into `items`.
    pub async fn download_keys(&mut self, mut keys: Vec<String>) -> Result<(), SyncError> {
        let mut queued: HashSet<String> = keys.iter().cloned().collect();
        let mut cursor = 0;

        while cursor < keys.len() {
            let mut batch = Vec::new();
            while cursor < keys.len() && batch.len() < DOWNLOAD_BATCH_LIMIT {
                let key = keys[cursor].clone();
                cursor += 1;
                let target = self.versions.get(&key);
                if let (Some(item), Some(&target)) = (self.items.get(&key), target) {
                    if item.version == target {
                        continue;
                    }
                }
                batch.push(key);
            }
            if batch.is_empty() {
                continue;
            }

            let mut page = self.client.items(&self.subscription, &batch).await?;
            loop {
                self.check(page.version)?;
                for mut item in std::mem::take(&mut page.data) {
                    if let Some(parent) = &item.data.parent_item {
                        if queued.insert(parent.clone()) {
                            keys.push(parent.clone());
                        }
                    }
                    if item.meta.num_children > 0 {
                        item.children = self.fetch_children(item.key.clone()).await?;
                    }
                    self.items.insert(item.key.clone(), item);
                }
                if page.done() {
                    break;
                }
                page = self.client.next_page(&page).await?;
            }
        }
        Ok(())
    }

    /// Fetches an item's child collection, flattening every child into the
    /// items cache. Children reporting children of their own are followed
    /// recursively under the same validation policy.
    fn fetch_children(
        &mut self,
        parent: String,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Item>, SyncError>> + Send + '_>> {
        Box::pin(async move {
            let mut children = Vec::new();
            let mut page = self.client.children(&self.subscription, &parent).await?;
            loop {
                self.check(page.version)?;
                for mut child in std::mem::take(&mut page.data) {
                    if child.meta.num_children > 0 {
                        child.children = self.fetch_children(child.key.clone()).await?;
                    }
                    self.items.insert(child.key.clone(), child.clone());
                    children.push(child);
                }
                if page.done() {
                    break;
                }
                page = self.client.next_page(&page).await?;
            }
            Ok(children)
        })
    }

    /// Returns the binary file content for an item, fetching it on first
    /// use. Later calls for the same key never refetch or overwrite.
    pub async fn attachment(&mut self, key: &str) -> Result<&[u8], SyncError> {
        if !self.attachments.contains_key(key) {
            let body = self.client.file(&self.subscription, key).await?;
            self.attachments.insert(key.to_string(), body);
        }
        Ok(self.attachments[key].as_slice())
    }

    /// Runs the synchronization with the default retry budget.
    pub async fn execute(&mut self, skip: bool) -> Result<(), SyncError> {
        self.execute_with_retries(skip, DEFAULT_RETRIES).await
    }

    /// Runs `update` then, unless `skip` is set, `download`.
    ///
    /// `skip` degrades the run to a version-only probe: the diff sets are
    /// recomputed but no payloads are fetched. An interrupted step waits
    /// out the signaled delay and retries while the budget lasts; caches
    /// populated before the interruption are kept.
    pub async fn execute_with_retries(
        &mut self,
        skip: bool,
        retries: u32,
    ) -> Result<(), SyncError> {
        let mut remaining = retries;
        loop {
            match self.run_once(skip).await {
                Err(SyncError::Interrupted { resume_after }) if remaining > 0 => {
                    remaining -= 1;
                    tracing::info!(
                        subscription = %self.subscription.id,
                        remaining,
                        "run interrupted, retrying after delay"
                    );
                    tokio::time::sleep(resume_after).await;
                }
                result => return result,
            }
        }
    }

    async fn run_once(&mut self, skip: bool) -> Result<(), SyncError> {
        self.update().await?;
        if !skip {
            self.download().await?;
        }
        Ok(())
    }
}
