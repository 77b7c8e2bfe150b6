use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::db::StoreError;
use crate::plugins::PluginError;

/// Delay before a run interrupted by a remote version change may resume.
pub const RESUME_DELAY: Duration = Duration::from_millis(5000);

/// Errors raised during a synchronization run.
///
/// `Interrupted` is the only self-healing kind: `Session::execute` retries
/// it within a bounded budget. Everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote library version advanced while this run was in flight.
    #[error("remote version changed mid-run, resume after {resume_after:?}")]
    Interrupted { resume_after: Duration },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("plugin {name} failed")]
    Plugin {
        name: String,
        #[source]
        source: PluginError,
    },
}

impl SyncError {
    pub(crate) fn interrupted() -> Self {
        SyncError::Interrupted {
            resume_after: RESUME_DELAY,
        }
    }

    /// True for the only recoverable error kind.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SyncError::Interrupted { .. })
    }
}
