//! Error types for the mirroring engine

use std::path::PathBuf;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error taxonomy for a mirroring run.
///
/// A vanished source file is deliberately absent from this list: the executor
/// records it as a failed operation outcome and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Invalid settings, fatal before any cycle runs
    #[error("Configuration error: {0}")]
    Config(String),

    /// A directory could not be enumerated or the replica root could not be created
    #[error("Tree access error at '{path}': {message}")]
    TreeAccess { path: PathBuf, message: String },

    /// A filesystem operation failed for a reason other than a vanished source
    #[error("Filesystem error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hash computation errors
    #[error("Hash computation error for '{path}': {message}")]
    Hash { path: PathBuf, message: String },

    /// Cancellation error
    #[error("Operation was cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new tree access error
    pub fn tree_access_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TreeAccess {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error together with the path it happened on
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a new hash error
    pub fn hash_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hash {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error ends the process rather than just the current cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Cancelled)
    }
}
