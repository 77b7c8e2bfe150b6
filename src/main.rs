use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfsync::api::{ApiClient, HttpTransport};
use shelfsync::commands::{
    ConfigCommand, ListenCommand, SubscriptionCommand, SyncCommand, UpdateCommand,
};
use shelfsync::config::{Config, ConfigError};
use shelfsync::db::{init_db, SqliteStore, SubscriptionStore};
use shelfsync::plugins::PluginRegistry;
use shelfsync::sync::Synchronizer;

#[derive(Parser)]
#[command(name = "shelfsync")]
#[command(version)]
#[command(about = "Mirror remote library collections incrementally", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize subscriptions against the remote API
    Sync(SyncCommand),

    /// Probe remote versions without downloading payloads
    Update(UpdateCommand),

    /// Listen for push notifications and synchronize on demand
    Listen(ListenCommand),

    /// Manage subscriptions
    Subscription(SubscriptionCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Sync(cmd)) => {
            let (synchronizer, store) = build(&config).await?;
            cmd.run(&synchronizer, store.as_ref()).await?;
        }
        Some(Commands::Update(cmd)) => {
            let (synchronizer, store) = build(&config).await?;
            cmd.run(&synchronizer, store.as_ref()).await?;
        }
        Some(Commands::Listen(cmd)) => {
            let (synchronizer, store) = build(&config).await?;
            cmd.run(&config, Arc::new(synchronizer), store).await?;
        }
        Some(Commands::Subscription(cmd)) => {
            let pool = init_db(config.database_path.clone()).await?;
            let store = SqliteStore::new(pool);
            cmd.run(&store).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

async fn build(
    config: &Config,
) -> Result<(Synchronizer, Arc<dyn SubscriptionStore>), Box<dyn std::error::Error>> {
    if !config.is_configured() {
        return Err(ConfigError::NotConfigured.into());
    }
    let pool = init_db(config.database_path.clone()).await?;
    let store: Arc<dyn SubscriptionStore> = Arc::new(SqliteStore::new(pool));
    let transport = Arc::new(HttpTransport::new(config.api_url.clone()));
    let client = Arc::new(ApiClient::new(transport));
    let synchronizer = Synchronizer::new(
        client,
        store.clone(),
        Arc::new(PluginRegistry::with_builtins()),
    );
    Ok((synchronizer, store))
}
