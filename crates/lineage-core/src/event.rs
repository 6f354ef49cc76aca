//! The event model: stream types, domain event variants, and the stored
//! (persisted) event shape.
//!
//! Events are immutable facts. The store assigns `version`,
//! `global_position`, and `occurred_at` at append time; everything else is
//! supplied by the caller as a [`DomainEvent`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// The aggregate kind a stream belongs to. Routes projection and filters
/// history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// An individual.
    Person,
    /// A family unit linking spouses and children.
    Family,
    /// A documentary source.
    Source,
    /// A citation of a source by some record.
    Citation,
    /// A media object (photo, scan, document).
    Media,
}

impl StreamType {
    /// All stream types, in a stable order.
    pub const ALL: [StreamType; 5] = [
        StreamType::Person,
        StreamType::Family,
        StreamType::Source,
        StreamType::Citation,
        StreamType::Media,
    ];

    /// The lowercase wire/storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Person => "person",
            StreamType::Family => "family",
            StreamType::Source => "source",
            StreamType::Citation => "citation",
            StreamType::Media => "media",
        }
    }

    /// Parses the storage name produced by [`StreamType::as_str`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] for an unknown name.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "person" => Ok(StreamType::Person),
            "family" => Ok(StreamType::Family),
            "source" => Ok(StreamType::Source),
            "citation" => Ok(StreamType::Citation),
            "media" => Ok(StreamType::Media),
            other => Err(StoreError::Decode(format!("unknown stream type: {other}"))),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field's before/after values inside an update diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// The value before the change.
    pub old: serde_json::Value,
    /// The value after the change.
    pub new: serde_json::Value,
}

/// Field name → before/after pair. `BTreeMap` keeps diff serialization
/// stable for tests and history output.
pub type ChangeSet = BTreeMap<String, FieldChange>;

/// Payload of `PersonCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonCreated {
    /// The new person's id (becomes the stream id).
    pub person_id: Uuid,
    /// Given names, space-separated.
    pub given_names: String,
    /// Surname at birth.
    pub surname: String,
    /// Sex, if recorded.
    pub sex: Option<String>,
    /// Birth date as entered (genealogical dates are free-form, e.g. "ABT 1850").
    pub birth_date: Option<String>,
    /// Death date as entered.
    pub death_date: Option<String>,
    /// Free-form research notes.
    pub notes: Option<String>,
}

/// Payload of `FamilyCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyCreated {
    /// The new family's id (becomes the stream id).
    pub family_id: Uuid,
    /// Husband/first partner, if known.
    pub husband_id: Option<Uuid>,
    /// Wife/second partner, if known.
    pub wife_id: Option<Uuid>,
    /// Marriage date as entered.
    pub marriage_date: Option<String>,
}

/// Payload of `SourceCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCreated {
    /// The new source's id (becomes the stream id).
    pub source_id: Uuid,
    /// Source title.
    pub title: String,
    /// Author, if known.
    pub author: Option<String>,
    /// Publication details.
    pub publication: Option<String>,
}

/// Payload of `CitationCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationCreated {
    /// The new citation's id (becomes the stream id).
    pub citation_id: Uuid,
    /// The cited source. Non-owning reference to another stream.
    pub source_id: Uuid,
    /// Page or locator within the source.
    pub page: Option<String>,
    /// Data quality assessment (GEDCOM QUAY, 0–3).
    pub quality: Option<i32>,
}

/// Payload of `MediaCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCreated {
    /// The new media object's id (becomes the stream id).
    pub media_id: Uuid,
    /// Display title.
    pub title: String,
    /// Stored file name.
    pub file_name: String,
    /// MIME type, if detected.
    pub mime_type: Option<String>,
}

/// Payload shared by every `*Updated` event: the entity id and the
/// field-level diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldsUpdated {
    /// The updated entity's id (the stream id).
    pub id: Uuid,
    /// Changed fields with before/after values.
    pub changes: ChangeSet,
}

/// Payload shared by every `*Deleted` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeleted {
    /// The deleted entity's id (the stream id).
    pub id: Uuid,
}

/// Payload of `ChildLinkedToFamily` / `ChildUnlinkedFromFamily`. These are
/// events on the *family* stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildLink {
    /// The family gaining or losing a child.
    pub family_id: Uuid,
    /// The child person.
    pub person_id: Uuid,
}

/// The closed set of domain events the core understands.
///
/// Every variant has exactly one decode case in [`DomainEvent::decode`] and
/// one projection handler; both matches are exhaustive, so adding a variant
/// without wiring it up fails to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A person was created.
    PersonCreated(PersonCreated),
    /// Person fields changed.
    PersonUpdated(FieldsUpdated),
    /// A person was deleted.
    PersonDeleted(EntityDeleted),
    /// A family was created.
    FamilyCreated(FamilyCreated),
    /// Family fields changed.
    FamilyUpdated(FieldsUpdated),
    /// A family was deleted.
    FamilyDeleted(EntityDeleted),
    /// A source was created.
    SourceCreated(SourceCreated),
    /// Source fields changed.
    SourceUpdated(FieldsUpdated),
    /// A source was deleted.
    SourceDeleted(EntityDeleted),
    /// A citation was created.
    CitationCreated(CitationCreated),
    /// Citation fields changed.
    CitationUpdated(FieldsUpdated),
    /// A citation was deleted.
    CitationDeleted(EntityDeleted),
    /// A media object was created.
    MediaCreated(MediaCreated),
    /// Media fields changed.
    MediaUpdated(FieldsUpdated),
    /// A media object was deleted.
    MediaDeleted(EntityDeleted),
    /// A child was linked to a family.
    ChildLinkedToFamily(ChildLink),
    /// A child was unlinked from a family.
    ChildUnlinkedFromFamily(ChildLink),
}

impl DomainEvent {
    /// Every event type discriminator, in a stable order. Used by
    /// exhaustiveness tests and by per-entity history filters.
    pub const ALL_TYPES: [&'static str; 17] = [
        "PersonCreated",
        "PersonUpdated",
        "PersonDeleted",
        "FamilyCreated",
        "FamilyUpdated",
        "FamilyDeleted",
        "SourceCreated",
        "SourceUpdated",
        "SourceDeleted",
        "CitationCreated",
        "CitationUpdated",
        "CitationDeleted",
        "MediaCreated",
        "MediaUpdated",
        "MediaDeleted",
        "ChildLinkedToFamily",
        "ChildUnlinkedFromFamily",
    ];

    /// The event type discriminator persisted alongside the payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::PersonCreated(_) => "PersonCreated",
            DomainEvent::PersonUpdated(_) => "PersonUpdated",
            DomainEvent::PersonDeleted(_) => "PersonDeleted",
            DomainEvent::FamilyCreated(_) => "FamilyCreated",
            DomainEvent::FamilyUpdated(_) => "FamilyUpdated",
            DomainEvent::FamilyDeleted(_) => "FamilyDeleted",
            DomainEvent::SourceCreated(_) => "SourceCreated",
            DomainEvent::SourceUpdated(_) => "SourceUpdated",
            DomainEvent::SourceDeleted(_) => "SourceDeleted",
            DomainEvent::CitationCreated(_) => "CitationCreated",
            DomainEvent::CitationUpdated(_) => "CitationUpdated",
            DomainEvent::CitationDeleted(_) => "CitationDeleted",
            DomainEvent::MediaCreated(_) => "MediaCreated",
            DomainEvent::MediaUpdated(_) => "MediaUpdated",
            DomainEvent::MediaDeleted(_) => "MediaDeleted",
            DomainEvent::ChildLinkedToFamily(_) => "ChildLinkedToFamily",
            DomainEvent::ChildUnlinkedFromFamily(_) => "ChildUnlinkedFromFamily",
        }
    }

    /// The stream this event belongs to.
    #[must_use]
    pub fn stream_id(&self) -> Uuid {
        match self {
            DomainEvent::PersonCreated(e) => e.person_id,
            DomainEvent::FamilyCreated(e) => e.family_id,
            DomainEvent::SourceCreated(e) => e.source_id,
            DomainEvent::CitationCreated(e) => e.citation_id,
            DomainEvent::MediaCreated(e) => e.media_id,
            DomainEvent::PersonUpdated(e)
            | DomainEvent::FamilyUpdated(e)
            | DomainEvent::SourceUpdated(e)
            | DomainEvent::CitationUpdated(e)
            | DomainEvent::MediaUpdated(e) => e.id,
            DomainEvent::PersonDeleted(e)
            | DomainEvent::FamilyDeleted(e)
            | DomainEvent::SourceDeleted(e)
            | DomainEvent::CitationDeleted(e)
            | DomainEvent::MediaDeleted(e) => e.id,
            DomainEvent::ChildLinkedToFamily(e) | DomainEvent::ChildUnlinkedFromFamily(e) => {
                e.family_id
            }
        }
    }

    /// The aggregate kind of the owning stream.
    #[must_use]
    pub fn stream_type(&self) -> StreamType {
        match self {
            DomainEvent::PersonCreated(_)
            | DomainEvent::PersonUpdated(_)
            | DomainEvent::PersonDeleted(_) => StreamType::Person,
            DomainEvent::FamilyCreated(_)
            | DomainEvent::FamilyUpdated(_)
            | DomainEvent::FamilyDeleted(_)
            | DomainEvent::ChildLinkedToFamily(_)
            | DomainEvent::ChildUnlinkedFromFamily(_) => StreamType::Family,
            DomainEvent::SourceCreated(_)
            | DomainEvent::SourceUpdated(_)
            | DomainEvent::SourceDeleted(_) => StreamType::Source,
            DomainEvent::CitationCreated(_)
            | DomainEvent::CitationUpdated(_)
            | DomainEvent::CitationDeleted(_) => StreamType::Citation,
            DomainEvent::MediaCreated(_)
            | DomainEvent::MediaUpdated(_)
            | DomainEvent::MediaDeleted(_) => StreamType::Media,
        }
    }

    /// Serializes the variant's payload for storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the payload cannot be serialized
    /// (cannot happen for these plain-data payloads, but the store
    /// propagates rather than panics).
    pub fn payload(&self) -> Result<serde_json::Value, StoreError> {
        let value = match self {
            DomainEvent::PersonCreated(e) => serde_json::to_value(e),
            DomainEvent::FamilyCreated(e) => serde_json::to_value(e),
            DomainEvent::SourceCreated(e) => serde_json::to_value(e),
            DomainEvent::CitationCreated(e) => serde_json::to_value(e),
            DomainEvent::MediaCreated(e) => serde_json::to_value(e),
            DomainEvent::PersonUpdated(e)
            | DomainEvent::FamilyUpdated(e)
            | DomainEvent::SourceUpdated(e)
            | DomainEvent::CitationUpdated(e)
            | DomainEvent::MediaUpdated(e) => serde_json::to_value(e),
            DomainEvent::PersonDeleted(e)
            | DomainEvent::FamilyDeleted(e)
            | DomainEvent::SourceDeleted(e)
            | DomainEvent::CitationDeleted(e)
            | DomainEvent::MediaDeleted(e) => serde_json::to_value(e),
            DomainEvent::ChildLinkedToFamily(e) | DomainEvent::ChildUnlinkedFromFamily(e) => {
                serde_json::to_value(e)
            }
        };
        value.map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Decodes a stored `(event_type, payload)` pair back into a variant.
    /// The mapping is exhaustive over [`DomainEvent::ALL_TYPES`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] for an unknown event type or a
    /// payload that does not match the variant's shape.
    pub fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, StoreError> {
        fn de<T: serde::de::DeserializeOwned>(
            event_type: &str,
            payload: &serde_json::Value,
        ) -> Result<T, StoreError> {
            serde_json::from_value(payload.clone())
                .map_err(|e| StoreError::Decode(format!("bad {event_type} payload: {e}")))
        }

        match event_type {
            "PersonCreated" => Ok(DomainEvent::PersonCreated(de(event_type, payload)?)),
            "PersonUpdated" => Ok(DomainEvent::PersonUpdated(de(event_type, payload)?)),
            "PersonDeleted" => Ok(DomainEvent::PersonDeleted(de(event_type, payload)?)),
            "FamilyCreated" => Ok(DomainEvent::FamilyCreated(de(event_type, payload)?)),
            "FamilyUpdated" => Ok(DomainEvent::FamilyUpdated(de(event_type, payload)?)),
            "FamilyDeleted" => Ok(DomainEvent::FamilyDeleted(de(event_type, payload)?)),
            "SourceCreated" => Ok(DomainEvent::SourceCreated(de(event_type, payload)?)),
            "SourceUpdated" => Ok(DomainEvent::SourceUpdated(de(event_type, payload)?)),
            "SourceDeleted" => Ok(DomainEvent::SourceDeleted(de(event_type, payload)?)),
            "CitationCreated" => Ok(DomainEvent::CitationCreated(de(event_type, payload)?)),
            "CitationUpdated" => Ok(DomainEvent::CitationUpdated(de(event_type, payload)?)),
            "CitationDeleted" => Ok(DomainEvent::CitationDeleted(de(event_type, payload)?)),
            "MediaCreated" => Ok(DomainEvent::MediaCreated(de(event_type, payload)?)),
            "MediaUpdated" => Ok(DomainEvent::MediaUpdated(de(event_type, payload)?)),
            "MediaDeleted" => Ok(DomainEvent::MediaDeleted(de(event_type, payload)?)),
            "ChildLinkedToFamily" => {
                Ok(DomainEvent::ChildLinkedToFamily(de(event_type, payload)?))
            }
            "ChildUnlinkedFromFamily" => {
                Ok(DomainEvent::ChildUnlinkedFromFamily(de(event_type, payload)?))
            }
            other => Err(StoreError::Decode(format!("unknown event type: {other}"))),
        }
    }

    /// Event types that belong to one aggregate kind. Used by the history
    /// service to translate an entity-type filter into an event-type filter.
    #[must_use]
    pub fn types_for_stream(stream_type: StreamType) -> &'static [&'static str] {
        match stream_type {
            StreamType::Person => &["PersonCreated", "PersonUpdated", "PersonDeleted"],
            StreamType::Family => &[
                "FamilyCreated",
                "FamilyUpdated",
                "FamilyDeleted",
                "ChildLinkedToFamily",
                "ChildUnlinkedFromFamily",
            ],
            StreamType::Source => &["SourceCreated", "SourceUpdated", "SourceDeleted"],
            StreamType::Citation => &["CitationCreated", "CitationUpdated", "CitationDeleted"],
            StreamType::Media => &["MediaCreated", "MediaUpdated", "MediaDeleted"],
        }
    }
}

/// A persisted event as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Store-wide monotonic position; the durable global ordering key.
    pub global_position: i64,
    /// Unique event identifier.
    pub event_id: Uuid,
    /// The owning stream (aggregate) id.
    pub stream_id: Uuid,
    /// The aggregate kind of the owning stream.
    pub stream_type: StreamType,
    /// 1-based, contiguous sequence number within the stream.
    pub version: i64,
    /// Discriminator selecting the payload variant.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Who performed the change, if the caller supplied it.
    pub actor: Option<String>,
    /// Store-assigned timestamp; display and range-filtering only, never a
    /// tie-breaker (that is `global_position`).
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Decodes the payload back into its [`DomainEvent`] variant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the stored type/payload pair is
    /// not one the core understands.
    pub fn to_domain(&self) -> Result<DomainEvent, StoreError> {
        DomainEvent::decode(&self.event_type, &self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(event_type: &str) -> DomainEvent {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        match event_type {
            "PersonCreated" => DomainEvent::PersonCreated(PersonCreated {
                person_id: id,
                given_names: "Ada".into(),
                surname: "Lovelace".into(),
                sex: Some("F".into()),
                birth_date: Some("10 DEC 1815".into()),
                death_date: None,
                notes: None,
            }),
            "FamilyCreated" => DomainEvent::FamilyCreated(FamilyCreated {
                family_id: id,
                husband_id: Some(other),
                wife_id: None,
                marriage_date: None,
            }),
            "SourceCreated" => DomainEvent::SourceCreated(SourceCreated {
                source_id: id,
                title: "1850 Census".into(),
                author: None,
                publication: None,
            }),
            "CitationCreated" => DomainEvent::CitationCreated(CitationCreated {
                citation_id: id,
                source_id: other,
                page: Some("p. 12".into()),
                quality: Some(3),
            }),
            "MediaCreated" => DomainEvent::MediaCreated(MediaCreated {
                media_id: id,
                title: "Portrait".into(),
                file_name: "portrait.jpg".into(),
                mime_type: Some("image/jpeg".into()),
            }),
            "ChildLinkedToFamily" => DomainEvent::ChildLinkedToFamily(ChildLink {
                family_id: id,
                person_id: other,
            }),
            "ChildUnlinkedFromFamily" => DomainEvent::ChildUnlinkedFromFamily(ChildLink {
                family_id: id,
                person_id: other,
            }),
            t if t.ends_with("Updated") => {
                let mut changes = ChangeSet::new();
                changes.insert(
                    "surname".into(),
                    FieldChange {
                        old: serde_json::json!("Smith"),
                        new: serde_json::json!("Jones"),
                    },
                );
                let updated = FieldsUpdated { id, changes };
                match t {
                    "PersonUpdated" => DomainEvent::PersonUpdated(updated),
                    "FamilyUpdated" => DomainEvent::FamilyUpdated(updated),
                    "SourceUpdated" => DomainEvent::SourceUpdated(updated),
                    "CitationUpdated" => DomainEvent::CitationUpdated(updated),
                    "MediaUpdated" => DomainEvent::MediaUpdated(updated),
                    _ => unreachable!(),
                }
            }
            t if t.ends_with("Deleted") => {
                let deleted = EntityDeleted { id };
                match t {
                    "PersonDeleted" => DomainEvent::PersonDeleted(deleted),
                    "FamilyDeleted" => DomainEvent::FamilyDeleted(deleted),
                    "SourceDeleted" => DomainEvent::SourceDeleted(deleted),
                    "CitationDeleted" => DomainEvent::CitationDeleted(deleted),
                    "MediaDeleted" => DomainEvent::MediaDeleted(deleted),
                    _ => unreachable!(),
                }
            }
            other => panic!("no sample for {other}"),
        }
    }

    #[test]
    fn every_event_type_round_trips_through_decode() {
        for event_type in DomainEvent::ALL_TYPES {
            let event = sample(event_type);
            assert_eq!(event.event_type(), event_type);
            let payload = event.payload().unwrap();
            let decoded = DomainEvent::decode(event_type, &payload).unwrap();
            assert_eq!(decoded, event, "decode mismatch for {event_type}");
        }
    }

    #[test]
    fn decode_rejects_unknown_event_type() {
        let err = DomainEvent::decode("PersonRenamed", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn decode_rejects_mismatched_payload() {
        let err = DomainEvent::decode("PersonCreated", &serde_json::json!({"nope": 1}))
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn types_for_stream_cover_all_types_exactly_once() {
        let mut seen: Vec<&str> = StreamType::ALL
            .into_iter()
            .flat_map(DomainEvent::types_for_stream)
            .copied()
            .collect();
        seen.sort_unstable();
        let mut all = DomainEvent::ALL_TYPES.to_vec();
        all.sort_unstable();
        assert_eq!(seen, all);
    }

    #[test]
    fn stream_type_parse_round_trips() {
        for st in StreamType::ALL {
            assert_eq!(StreamType::parse(st.as_str()).unwrap(), st);
        }
        assert!(StreamType::parse("import").is_err());
    }

    #[test]
    fn child_link_events_belong_to_the_family_stream() {
        let link = ChildLink {
            family_id: Uuid::new_v4(),
            person_id: Uuid::new_v4(),
        };
        let event = DomainEvent::ChildLinkedToFamily(link.clone());
        assert_eq!(event.stream_id(), link.family_id);
        assert_eq!(event.stream_type(), StreamType::Family);
    }
}
