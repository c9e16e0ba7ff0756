//! Error types for engine operations.

use capture_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the engine.
///
/// Routing, scoring and incubation never fail on bad input; they fall back
/// to `create` or "no suggestion". What remains is storage failure and
/// requests that name something that does not exist.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The persistent store failed. Propagated unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An action was missing a field it needs.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Returns true if this error wraps a storage failure.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
