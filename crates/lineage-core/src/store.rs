//! The event store contract.
//!
//! Append-only by design: there is no update or delete on this interface.
//! Corrections are expressed as new events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::{DomainEvent, StoredEvent, StreamType};

/// One page of a single stream, most recent version first.
#[derive(Debug, Clone)]
pub struct StreamSlice {
    /// The page of events, ordered by `version` descending.
    pub events: Vec<StoredEvent>,
    /// Total events in the stream, independent of the page bounds.
    pub total: i64,
}

/// Filter and pagination for the global feed.
#[derive(Debug, Clone)]
pub struct GlobalFilter {
    /// Inclusive lower bound on `occurred_at`; `None` means unbounded.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `occurred_at`; `None` means unbounded.
    pub to: Option<DateTime<Utc>>,
    /// Restrict to these event types; empty means all types.
    pub event_types: Vec<String>,
    /// Maximum events to return.
    pub limit: i64,
    /// Events to skip.
    pub offset: i64,
}

impl Default for GlobalFilter {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            event_types: Vec::new(),
            limit: 50,
            offset: 0,
        }
    }
}

/// One page of the global feed, newest first.
#[derive(Debug, Clone)]
pub struct GlobalSlice {
    /// Events ordered by `occurred_at` descending, ties broken by
    /// `global_position` descending.
    pub events: Vec<StoredEvent>,
    /// Total matching events, independent of the page bounds.
    pub total: i64,
    /// Whether more events exist past this page.
    pub has_more: bool,
}

/// Append/read contract for the append-only event log. Implemented by both
/// storage backends; behavior is pinned by the shared suite in
/// `lineage-test-support`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically appends `events` to a stream, assigning contiguous
    /// versions starting at `expected_version + 1` and a fresh global
    /// position each, then applies the projection of every event in the
    /// same transaction. Returns the resulting stream version.
    ///
    /// `actor` is an optional identifier of who performed the change,
    /// recorded on every event in the batch.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] if `events` is empty or any event's
    ///   stream id/type does not match `stream_id`/`stream_type`.
    /// - [`StoreError::VersionConflict`] if the stream's current version is
    ///   not `expected_version`. The store never retries; that is the
    ///   caller's decision.
    /// - [`StoreError::Projection`] if a projection fails — the whole
    ///   batch, events included, is rolled back.
    /// - [`StoreError::Storage`] on backend failure.
    async fn append(
        &self,
        stream_id: Uuid,
        stream_type: StreamType,
        expected_version: i64,
        events: &[DomainEvent],
        actor: Option<String>,
    ) -> Result<i64, StoreError>;

    /// Reads one stream, most recent version first. An unknown stream
    /// yields an empty slice, not an error.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] on backend failure.
    async fn read_stream(
        &self,
        stream_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<StreamSlice, StoreError>;

    /// Reads the global feed across all streams, newest first, optionally
    /// bounded by time window and event types.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] on backend failure.
    async fn read_global(&self, filter: &GlobalFilter) -> Result<GlobalSlice, StoreError>;
}

/// Validates the structural invariants of an append batch. Shared by both
/// backends so they reject identical inputs identically.
///
/// # Errors
///
/// [`StoreError::Validation`] for an empty batch or an event whose stream
/// id or type does not match the target stream.
pub fn validate_batch(
    stream_id: Uuid,
    stream_type: StreamType,
    expected_version: i64,
    events: &[DomainEvent],
) -> Result<(), StoreError> {
    if events.is_empty() {
        return Err(StoreError::Validation("empty event batch".into()));
    }
    if expected_version < 0 {
        return Err(StoreError::Validation(format!(
            "expected version must be >= 0, got {expected_version}"
        )));
    }
    for event in events {
        if event.stream_id() != stream_id {
            return Err(StoreError::Validation(format!(
                "event {} targets stream {}, not {stream_id}",
                event.event_type(),
                event.stream_id()
            )));
        }
        if event.stream_type() != stream_type {
            return Err(StoreError::Validation(format!(
                "event {} belongs to a {} stream, not {stream_type}",
                event.event_type(),
                event.stream_type()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EntityDeleted;

    #[test]
    fn default_global_filter_serves_a_first_page() {
        let filter = GlobalFilter::default();
        assert_eq!(filter.limit, 50);
        assert_eq!(filter.offset, 0);
        assert!(filter.from.is_none());
        assert!(filter.to.is_none());
        assert!(filter.event_types.is_empty());
    }

    #[test]
    fn validate_batch_rejects_empty_batch() {
        let err = validate_batch(Uuid::new_v4(), StreamType::Person, 0, &[]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn validate_batch_rejects_stream_id_mismatch() {
        let event = DomainEvent::PersonDeleted(EntityDeleted { id: Uuid::new_v4() });
        let err =
            validate_batch(Uuid::new_v4(), StreamType::Person, 1, &[event]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn validate_batch_rejects_stream_type_mismatch() {
        let id = Uuid::new_v4();
        let event = DomainEvent::PersonDeleted(EntityDeleted { id });
        let err = validate_batch(id, StreamType::Source, 1, &[event]).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn validate_batch_accepts_matching_events() {
        let id = Uuid::new_v4();
        let event = DomainEvent::PersonDeleted(EntityDeleted { id });
        validate_batch(id, StreamType::Person, 1, &[event]).unwrap();
    }
}
