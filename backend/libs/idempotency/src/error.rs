//! Error types for the idempotency guard library

use thiserror::Error;

/// Result type for idempotency operations
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Errors that can occur while admitting a scope key
#[derive(Error, Debug)]
pub enum IdempotencyError {
    /// Scope key validation failed (empty, too long)
    #[error("invalid scope key: {0}")]
    InvalidKey(String),

    /// The backing store could not be reached.
    ///
    /// Only surfaced to callers on fail-closed paths; fail-open call
    /// sites swallow this and proceed without deduplication.
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
}
