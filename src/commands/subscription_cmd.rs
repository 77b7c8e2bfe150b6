//! CLI commands for managing stored subscriptions.

use clap::{Args, Subcommand};

use crate::db::SubscriptionStore;
use crate::models::{PluginDescriptor, Subscription};

#[derive(Debug, Args)]
pub struct SubscriptionCommand {
    #[command(subcommand)]
    command: SubscriptionSubcommand,
}

#[derive(Debug, Subcommand)]
enum SubscriptionSubcommand {
    /// Register a new library subscription
    Add {
        /// Remote library path, e.g. /users/475425
        library: String,

        /// Sub-path under the library (defaults to /items)
        #[arg(long)]
        path: Option<String>,

        /// API credential for the library and its stream topic
        #[arg(long)]
        key: Option<String>,

        /// Plugin to run after each synchronization (can be repeated)
        #[arg(long = "plugin", value_name = "NAME")]
        plugins: Vec<String>,
    },

    /// List subscriptions
    List,

    /// Remove a subscription
    Remove {
        /// Subscription id
        id: String,
    },
}

impl SubscriptionCommand {
    pub async fn run(
        &self,
        store: &dyn SubscriptionStore,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SubscriptionSubcommand::Add {
                library,
                path,
                key,
                plugins,
            } => {
                let mut subscription = Subscription::new(library);
                subscription.path = path.clone();
                subscription.key = key.clone();
                subscription.plugins = plugins
                    .iter()
                    .map(|name| PluginDescriptor::new(name.clone()))
                    .collect();
                store.save(&subscription).await?;
                println!("Added subscription {} for {}", subscription.id, library);
            }
            SubscriptionSubcommand::List => {
                let subscriptions = store.list().await?;
                if subscriptions.is_empty() {
                    println!("No subscriptions.");
                    return Ok(());
                }
                for subscription in subscriptions {
                    let plugins: Vec<&str> = subscription
                        .plugins
                        .iter()
                        .map(|descriptor| descriptor.name.as_str())
                        .collect();
                    println!(
                        "{}  {}  version {}  plugins: {}",
                        subscription.id,
                        subscription.library,
                        subscription.version,
                        if plugins.is_empty() {
                            "-".to_string()
                        } else {
                            plugins.join(", ")
                        }
                    );
                }
            }
            SubscriptionSubcommand::Remove { id } => {
                store.remove(id).await?;
                println!("Removed subscription {}", id);
            }
        }
        Ok(())
    }
}
