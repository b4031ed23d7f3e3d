use std::path::PathBuf;

use thiserror::Error;

/// Error kinds for one synchronization pass. Build-phase errors (`Config`,
/// `Access`, `Store`) abort the pass before anything is mutated; execution
/// failures are downgraded to per-operation outcomes by the executor.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("folder does not exist or is not a directory: {path}")]
    Config { path: PathBuf },

    #[error("scan failed under {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source path missing: {path}")]
    NotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("inventory store failure: {0}")]
    Store(#[from] rusqlite::Error),
}

impl SyncError {
    /// Stable label used in operation outcomes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Config { .. } => "config",
            SyncError::Access { .. } => "access",
            SyncError::NotFound { .. } => "not_found",
            SyncError::Io(_) => "io",
            SyncError::Store(_) => "store",
        }
    }
}
