//! Lock registry error types.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The key's own `Hash`, `Eq` or `Clone` panicked while this caller was
    /// acquiring. Nothing was acquired; the registry and other callers are
    /// unaffected.
    #[error("lock acquisition interrupted")]
    Interrupted,
}
