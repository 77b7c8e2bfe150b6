mod config_cmd;
mod listen_cmd;
mod subscription_cmd;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use listen_cmd::ListenCommand;
pub use subscription_cmd::SubscriptionCommand;
pub use sync_cmd::{SyncCommand, UpdateCommand};
