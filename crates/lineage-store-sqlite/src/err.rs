//! Mapping between `tokio_rusqlite` call errors and the core error type.
//!
//! Domain errors raised inside a `call` closure (version conflicts,
//! projection failures) travel out as `tokio_rusqlite::Error::Other` and
//! are downcast back on the async side; everything else is a storage
//! failure.

use lineage_core::error::StoreError;

/// Wraps a domain error so it can abort a `call` closure (and its
/// transaction) without being flattened into a storage error.
pub fn abort(err: StoreError) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(err))
}

/// Unwraps the result of a `call`, recovering domain errors smuggled
/// through [`abort`].
pub fn call_err(err: tokio_rusqlite::Error) -> StoreError {
    match err {
        tokio_rusqlite::Error::Other(inner) => match inner.downcast::<StoreError>() {
            Ok(store_err) => *store_err,
            Err(other) => StoreError::Storage(other.to_string()),
        },
        other => StoreError::Storage(other.to_string()),
    }
}
