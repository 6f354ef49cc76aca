//! Lineage History — the audit query service.
//!
//! A stateless read-side transformer: it replays stored events and renders
//! them as human-facing change entries with field-level diffs and resolved
//! entity names. It never writes, and it never fails just because an
//! entity has since been deleted — audit trails for deleted entities are a
//! feature, so a missing name becomes an empty string instead of an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::event::{ChangeSet, DomainEvent, StoredEvent, StreamType};
use lineage_core::read_model::{
    CitationRecord, EntityStore, FamilyRecord, MediaRecord, PersonRecord, ReadModel,
    ReadModelStore, SourceRecord,
};
use lineage_core::store::{EventStore, GlobalFilter};

/// What a change entry did to its entity, derived from the event-type
/// suffix. Structural family events (child link/unlink) render as updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// The entity came into existence.
    Created,
    /// Fields or structure changed.
    Updated,
    /// The entity was removed.
    Deleted,
}

impl ChangeAction {
    fn from_event_type(event_type: &str) -> Self {
        if event_type.ends_with("Created") {
            ChangeAction::Created
        } else if event_type.ends_with("Deleted") {
            ChangeAction::Deleted
        } else {
            ChangeAction::Updated
        }
    }
}

/// A human-facing rendering of one stored event. Computed on read, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEntry {
    /// The entity's aggregate kind.
    pub entity_type: StreamType,
    /// The entity's id.
    pub entity_id: Uuid,
    /// Best-effort display name from the current read models; empty once
    /// the entity is deleted.
    pub entity_name: String,
    /// What happened.
    pub action: ChangeAction,
    /// The underlying event type.
    pub event_type: String,
    /// The event's version within its stream.
    pub version: i64,
    /// Field-level before/after diff; present for update events only.
    pub changes: Option<ChangeSet>,
    /// Who made the change, if recorded.
    pub actor: Option<String>,
    /// When the change was recorded.
    pub occurred_at: DateTime<Utc>,
}

/// One page of history.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeHistory {
    /// Entries, most recent first.
    pub entries: Vec<ChangeEntry>,
    /// Total matching events.
    pub total: i64,
    /// Whether more entries exist past this page.
    pub has_more: bool,
}

/// Filter for [`HistoryService::global_history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Restrict to one entity kind; `None` means all.
    pub entity_type: Option<StreamType>,
    /// Inclusive lower time bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub to: Option<DateTime<Utc>>,
    /// Maximum entries to return.
    pub limit: i64,
    /// Entries to skip.
    pub offset: i64,
}

/// The history/audit query service. Stateless; reads events from the
/// event store and names from the read models.
#[derive(Clone)]
pub struct HistoryService {
    events: Arc<dyn EventStore>,
    read_models: Arc<dyn ReadModelStore>,
}

impl HistoryService {
    /// Creates a service over the given stores.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, read_models: Arc<dyn ReadModelStore>) -> Self {
        Self {
            events,
            read_models,
        }
    }

    /// Change history for one entity, most recent first. Works for deleted
    /// entities; their name falls back to an empty string.
    ///
    /// # Errors
    ///
    /// Propagates store read failures and event decode failures.
    pub async fn entity_history(
        &self,
        entity_type: StreamType,
        entity_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<ChangeHistory, StoreError> {
        let slice = self.events.read_stream(entity_id, limit, offset).await?;
        let name = self.resolve_name(entity_type, entity_id).await?;

        let mut entries = Vec::with_capacity(slice.events.len());
        for event in &slice.events {
            entries.push(to_entry(event, name.clone())?);
        }

        let has_more = offset + i64::try_from(entries.len()).unwrap_or(0) < slice.total;
        Ok(ChangeHistory {
            entries,
            total: slice.total,
            has_more,
        })
    }

    /// Change history across all streams, most recent first, optionally
    /// filtered by entity kind and time window.
    ///
    /// # Errors
    ///
    /// Propagates store read failures and event decode failures.
    pub async fn global_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<ChangeHistory, StoreError> {
        let event_types = filter
            .entity_type
            .map(|entity_type| {
                DomainEvent::types_for_stream(entity_type)
                    .iter()
                    .map(|t| (*t).to_owned())
                    .collect()
            })
            .unwrap_or_default();

        let slice = self
            .events
            .read_global(&GlobalFilter {
                from: filter.from,
                to: filter.to,
                event_types,
                limit: filter.limit,
                offset: filter.offset,
            })
            .await?;

        // Name lookups are cached per (stream) id for the page.
        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut entries = Vec::with_capacity(slice.events.len());
        for event in &slice.events {
            let name = match names.get(&event.stream_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.resolve_name(event.stream_type, event.stream_id).await?;
                    names.insert(event.stream_id, name.clone());
                    name
                }
            };
            entries.push(to_entry(event, name)?);
        }

        Ok(ChangeHistory {
            entries,
            total: slice.total,
            has_more: slice.has_more,
        })
    }

    /// Best-effort display name for an entity; empty string if it no
    /// longer exists.
    async fn resolve_name(
        &self,
        entity_type: StreamType,
        id: Uuid,
    ) -> Result<String, StoreError> {
        match entity_type {
            StreamType::Person => self.label_of::<PersonRecord>(id).await,
            StreamType::Source => self.label_of::<SourceRecord>(id).await,
            StreamType::Citation => self.label_of::<CitationRecord>(id).await,
            StreamType::Media => self.label_of::<MediaRecord>(id).await,
            StreamType::Family => self.family_name(id).await,
        }
    }

    async fn label_of<R: ReadModel>(&self, id: Uuid) -> Result<String, StoreError>
    where
        dyn ReadModelStore: EntityStore<R>,
    {
        match EntityStore::<R>::get(self.read_models.as_ref(), id).await {
            Ok(record) => Ok(record.display_label()),
            Err(StoreError::NotFound { .. }) => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    /// Families are named after their spouses, joined on read from the
    /// person records.
    async fn family_name(&self, id: Uuid) -> Result<String, StoreError> {
        let family =
            match EntityStore::<FamilyRecord>::get(self.read_models.as_ref(), id).await {
                Ok(family) => family,
                Err(StoreError::NotFound { .. }) => return Ok(String::new()),
                Err(err) => return Err(err),
            };

        let mut spouses = Vec::new();
        for spouse_id in [family.husband_id, family.wife_id].into_iter().flatten() {
            let name = self.label_of::<PersonRecord>(spouse_id).await?;
            if !name.is_empty() {
                spouses.push(name);
            }
        }

        if spouses.is_empty() {
            Ok(family.display_label())
        } else {
            Ok(spouses.join(" & "))
        }
    }
}

/// Maps one stored event to a change entry. Diffs are taken straight from
/// the decoded `*Updated` payload.
fn to_entry(event: &StoredEvent, entity_name: String) -> Result<ChangeEntry, StoreError> {
    let changes = match event.to_domain()? {
        DomainEvent::PersonUpdated(e)
        | DomainEvent::FamilyUpdated(e)
        | DomainEvent::SourceUpdated(e)
        | DomainEvent::CitationUpdated(e)
        | DomainEvent::MediaUpdated(e) => Some(e.changes),
        _ => None,
    };

    Ok(ChangeEntry {
        entity_type: event.stream_type,
        entity_id: event.stream_id,
        entity_name,
        action: ChangeAction::from_event_type(&event.event_type),
        event_type: event.event_type.clone(),
        version: event.version,
        changes,
        actor: event.actor.clone(),
        occurred_at: event.occurred_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_is_derived_from_the_event_type_suffix() {
        assert_eq!(
            ChangeAction::from_event_type("PersonCreated"),
            ChangeAction::Created
        );
        assert_eq!(
            ChangeAction::from_event_type("CitationDeleted"),
            ChangeAction::Deleted
        );
        assert_eq!(
            ChangeAction::from_event_type("SourceUpdated"),
            ChangeAction::Updated
        );
        assert_eq!(
            ChangeAction::from_event_type("ChildLinkedToFamily"),
            ChangeAction::Updated
        );
    }
}
