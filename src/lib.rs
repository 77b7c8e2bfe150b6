//! shelfsync
//!
//! Incremental mirroring of remote, version-stamped library collections:
//! a synchronization session engine (version diffing, batched and recursive
//! item download, interrupted-run retry) driven either by polling or by push
//! notifications from a topic-multiplexed streaming channel.

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod models;
pub mod plugins;
pub mod stream;
pub mod sync;

pub use api::{ApiClient, ApiError, HttpTransport};
pub use config::Config;
pub use db::{SqliteStore, StoreError, SubscriptionStore};
pub use models::{Item, PluginDescriptor, Subscription};
pub use plugins::{Plugin, PluginError, PluginRegistry};
pub use stream::{Listener, ListenerEvent, Registration, StreamError, WsChannel};
pub use sync::{Session, SyncError, Synchronizer};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
