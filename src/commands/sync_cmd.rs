//! CLI commands driving synchronization runs.

use clap::Args;

use crate::db::SubscriptionStore;
use crate::models::Subscription;
use crate::sync::Synchronizer;

/// Synchronize subscriptions against the remote API
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Subscription id; all subscriptions when omitted
    id: Option<String>,
}

impl SyncCommand {
    pub async fn run(
        &self,
        synchronizer: &Synchronizer,
        store: &dyn SubscriptionStore,
    ) -> Result<(), Box<dyn std::error::Error>> {
        run_all(synchronizer, store, self.id.as_deref(), false).await
    }
}

/// Probe remote versions without downloading payloads
#[derive(Debug, Args)]
pub struct UpdateCommand {
    /// Subscription id; all subscriptions when omitted
    id: Option<String>,
}

impl UpdateCommand {
    pub async fn run(
        &self,
        synchronizer: &Synchronizer,
        store: &dyn SubscriptionStore,
    ) -> Result<(), Box<dyn std::error::Error>> {
        run_all(synchronizer, store, self.id.as_deref(), true).await
    }
}

async fn run_all(
    synchronizer: &Synchronizer,
    store: &dyn SubscriptionStore,
    id: Option<&str>,
    skip: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let subscriptions: Vec<Subscription> = match id {
        Some(id) => {
            let subscription = store
                .load(id)
                .await?
                .ok_or_else(|| format!("Subscription not found: {}", id))?;
            vec![subscription]
        }
        None => store.list().await?,
    };

    if subscriptions.is_empty() {
        println!("No subscriptions. Add one with `shelfsync subscription add`.");
        return Ok(());
    }

    for mut subscription in subscriptions {
        let label = subscription.library.clone();
        let session = synchronizer.synchronize(&mut subscription, skip).await?;
        if session.modified() {
            println!(
                "  ✓ {} -> version {} ({} new, {} changed, {} deleted)",
                label,
                subscription.version,
                session.created.len(),
                session.updated.len(),
                session.deleted.len()
            );
        } else {
            println!("  ✓ {} up to date", label);
        }
    }

    Ok(())
}
