//! Error types for the storage layer.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A compare-and-swap saw a different version than expected.
    #[error("version conflict on {key}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// An in-memory lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl StoreError {
    /// Returns true if retrying the read-modify-write may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
