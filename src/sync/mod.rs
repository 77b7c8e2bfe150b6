//! Synchronization core.
//!
//! A run for one subscription proceeds in two phases:
//! 1. Version diff: fetch the remote manifest (key -> version), classify
//!    every key as created, updated or deleted against the last known state
//! 2. Download: fetch payloads for new and changed keys in bounded batches,
//!    following parent references and child collections within the same run
//!
//! Both phases validate every paginated response against the first observed
//! remote version; a mismatch means the remote collection changed mid-run
//! and the whole run is retried after a fixed delay.

mod error;
mod session;
mod synchronizer;

pub use error::{SyncError, RESUME_DELAY};
pub use session::{Session, DEFAULT_RETRIES, DOWNLOAD_BATCH_LIMIT};
pub use synchronizer::Synchronizer;
