//! Error taxonomy for the persistence core.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type shared by the event store, the read-model store,
/// and the history service.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input to an append (empty batch, stream id mismatch).
    /// Caller's bug; not retryable as-is.
    #[error("validation error: {0}")]
    Validation(String),

    /// Optimistic concurrency violation on append. The caller must re-read
    /// current state and retry with a corrected expected version, or
    /// surface the conflict to the end user.
    #[error(
        "version conflict on stream {stream_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        /// The stream that had the conflict.
        stream_id: Uuid,
        /// The version the caller expected.
        expected: i64,
        /// The version actually stored.
        actual: i64,
    },

    /// A read-model lookup against a nonexistent id.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind, e.g. `"person"`.
        entity: &'static str,
        /// The id that was looked up.
        id: Uuid,
    },

    /// A stored event could not be decoded into a domain event.
    #[error("event decode error: {0}")]
    Decode(String),

    /// A projection failed while being applied; the enclosing transaction
    /// must roll back so the event never becomes durable without it.
    #[error("projection error: {0}")]
    Projection(String),

    /// Underlying I/O or connectivity failure. Fatal to the current
    /// request; never retried inside the core.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Wraps any backend error as a [`StoreError::Storage`].
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
