//! Event → read-model mutation handlers, one per event variant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use lineage_core::event::DomainEvent;
use lineage_core::read_model::{
    CitationRecord, FamilyRecord, MediaRecord, PersonRecord, SourceRecord,
};

use crate::diff::apply_changes;

/// A projection failure. Aborts the enclosing append transaction.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An `*Updated` or structural event arrived for a record that does
    /// not exist. The event store's ordering guarantees make this a data
    /// defect, not a race.
    #[error("{entity} record {id} missing during projection")]
    MissingRecord {
        /// The entity kind.
        entity: &'static str,
        /// The missing record's id.
        id: Uuid,
    },

    /// An update diff could not be applied to the record.
    #[error("invalid update diff: {0}")]
    InvalidDiff(String),
}

impl From<ProjectionError> for lineage_core::error::StoreError {
    fn from(err: ProjectionError) -> Self {
        lineage_core::error::StoreError::Projection(err.to_string())
    }
}

/// Store-assigned attributes of the event being projected.
#[derive(Debug, Clone, Copy)]
pub struct EventContext {
    /// The event's version within its stream; becomes the record's version.
    pub version: i64,
    /// The event's timestamp; becomes the record's `updated_at`.
    pub occurred_at: DateTime<Utc>,
}

/// Names one read-model record a projection needs to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRef {
    /// A person record.
    Person(Uuid),
    /// A family record.
    Family(Uuid),
    /// A source record.
    Source(Uuid),
    /// A citation record.
    Citation(Uuid),
    /// A media record.
    Media(Uuid),
}

/// Records fetched for a projection, keyed by id. Refs that did not
/// resolve (record absent) are simply not present.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    /// Loaded person records.
    pub persons: HashMap<Uuid, PersonRecord>,
    /// Loaded family records.
    pub families: HashMap<Uuid, FamilyRecord>,
    /// Loaded source records.
    pub sources: HashMap<Uuid, SourceRecord>,
    /// Loaded citation records.
    pub citations: HashMap<Uuid, CitationRecord>,
    /// Loaded media records.
    pub media: HashMap<Uuid, MediaRecord>,
}

/// One read-model write implied by an event. Backends execute these inside
/// the append transaction.
///
/// The adjust/set/clear variants are deliberately conditional at the SQL
/// level: they no-op when the target row is absent, which is how
/// cross-stream denormalization stays tolerant of deletion ordering the
/// core does not enforce.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Upsert a person record.
    SavePerson(PersonRecord),
    /// Delete a person record.
    DeletePerson(Uuid),
    /// Upsert a family record.
    SaveFamily(FamilyRecord),
    /// Delete a family record.
    DeleteFamily(Uuid),
    /// Upsert a source record.
    SaveSource(SourceRecord),
    /// Delete a source record.
    DeleteSource(Uuid),
    /// Upsert a citation record.
    SaveCitation(CitationRecord),
    /// Delete a citation record.
    DeleteCitation(Uuid),
    /// Upsert a media record.
    SaveMedia(MediaRecord),
    /// Delete a media record.
    DeleteMedia(Uuid),
    /// Add `delta` to a source's citation count, if the source still
    /// exists. Does not bump the source's version.
    AdjustCitationCount {
        /// The source whose count changes.
        source_id: Uuid,
        /// +1 on citation creation, -1 on deletion.
        delta: i64,
    },
    /// Point a person at their parent family, if the person still exists.
    /// Does not bump the person's version.
    SetParentFamily {
        /// The linked child.
        person_id: Uuid,
        /// The family they were linked to.
        family_id: Uuid,
    },
    /// Clear a person's parent family, but only if it still points at
    /// `family_id`. Does not bump the person's version.
    ClearParentFamily {
        /// The unlinked child.
        person_id: Uuid,
        /// The family they were unlinked from.
        family_id: Uuid,
    },
}

/// The records [`project`] will need for this event. Backends load these
/// from the read models inside the append transaction and pass them in as
/// [`LoadedRecords`].
#[must_use]
pub fn required_reads(event: &DomainEvent) -> Vec<RecordRef> {
    match event {
        DomainEvent::PersonUpdated(e) => vec![RecordRef::Person(e.id)],
        DomainEvent::FamilyUpdated(e) => vec![RecordRef::Family(e.id)],
        DomainEvent::SourceUpdated(e) => vec![RecordRef::Source(e.id)],
        DomainEvent::CitationUpdated(e) => vec![RecordRef::Citation(e.id)],
        DomainEvent::MediaUpdated(e) => vec![RecordRef::Media(e.id)],
        // Title snapshot comes from the source at creation time.
        DomainEvent::CitationCreated(e) => vec![RecordRef::Source(e.source_id)],
        // The citation's source id is needed to decrement the count.
        DomainEvent::CitationDeleted(e) => vec![RecordRef::Citation(e.id)],
        DomainEvent::ChildLinkedToFamily(e) | DomainEvent::ChildUnlinkedFromFamily(e) => {
            vec![RecordRef::Family(e.family_id)]
        }
        DomainEvent::PersonCreated(_)
        | DomainEvent::PersonDeleted(_)
        | DomainEvent::FamilyCreated(_)
        | DomainEvent::FamilyDeleted(_)
        | DomainEvent::SourceCreated(_)
        | DomainEvent::SourceDeleted(_)
        | DomainEvent::MediaCreated(_)
        | DomainEvent::MediaDeleted(_) => vec![],
    }
}

/// Computes the read-model mutations implied by one event.
///
/// The match is exhaustive over the closed [`DomainEvent`] set, which is
/// what guarantees every decodable event has a projection handler.
///
/// # Errors
///
/// [`ProjectionError::MissingRecord`] when an update or structural event
/// targets an absent record; [`ProjectionError::InvalidDiff`] when an
/// update diff does not fit the record.
pub fn project(
    event: &DomainEvent,
    ctx: &EventContext,
    loaded: &LoadedRecords,
) -> Result<Vec<Mutation>, ProjectionError> {
    match event {
        DomainEvent::PersonCreated(e) => Ok(vec![Mutation::SavePerson(PersonRecord {
            id: e.person_id,
            given_names: e.given_names.clone(),
            surname: e.surname.clone(),
            sex: e.sex.clone(),
            birth_date: e.birth_date.clone(),
            death_date: e.death_date.clone(),
            notes: e.notes.clone(),
            parent_family_id: None,
            version: ctx.version,
            updated_at: ctx.occurred_at,
        })]),
        DomainEvent::PersonUpdated(e) => {
            let record = loaded
                .persons
                .get(&e.id)
                .ok_or(ProjectionError::MissingRecord {
                    entity: "person",
                    id: e.id,
                })?;
            let updated = apply_changes(record, &e.changes, ctx.version, ctx.occurred_at)?;
            Ok(vec![Mutation::SavePerson(updated)])
        }
        DomainEvent::PersonDeleted(e) => Ok(vec![Mutation::DeletePerson(e.id)]),

        DomainEvent::FamilyCreated(e) => Ok(vec![Mutation::SaveFamily(FamilyRecord {
            id: e.family_id,
            husband_id: e.husband_id,
            wife_id: e.wife_id,
            marriage_date: e.marriage_date.clone(),
            children: Vec::new(),
            version: ctx.version,
            updated_at: ctx.occurred_at,
        })]),
        DomainEvent::FamilyUpdated(e) => {
            let record = loaded
                .families
                .get(&e.id)
                .ok_or(ProjectionError::MissingRecord {
                    entity: "family",
                    id: e.id,
                })?;
            let updated = apply_changes(record, &e.changes, ctx.version, ctx.occurred_at)?;
            Ok(vec![Mutation::SaveFamily(updated)])
        }
        DomainEvent::FamilyDeleted(e) => Ok(vec![Mutation::DeleteFamily(e.id)]),

        DomainEvent::SourceCreated(e) => Ok(vec![Mutation::SaveSource(SourceRecord {
            id: e.source_id,
            title: e.title.clone(),
            author: e.author.clone(),
            publication: e.publication.clone(),
            citation_count: 0,
            version: ctx.version,
            updated_at: ctx.occurred_at,
        })]),
        DomainEvent::SourceUpdated(e) => {
            let record = loaded
                .sources
                .get(&e.id)
                .ok_or(ProjectionError::MissingRecord {
                    entity: "source",
                    id: e.id,
                })?;
            let updated = apply_changes(record, &e.changes, ctx.version, ctx.occurred_at)?;
            Ok(vec![Mutation::SaveSource(updated)])
        }
        DomainEvent::SourceDeleted(e) => Ok(vec![Mutation::DeleteSource(e.id)]),

        DomainEvent::CitationCreated(e) => {
            // The title is a snapshot taken when the citation is made; a
            // later source rename leaves it untouched. Documented decision,
            // not a missed join.
            let source_title = loaded
                .sources
                .get(&e.source_id)
                .map(|s| s.title.clone())
                .unwrap_or_default();
            Ok(vec![
                Mutation::SaveCitation(CitationRecord {
                    id: e.citation_id,
                    source_id: e.source_id,
                    source_title,
                    page: e.page.clone(),
                    quality: e.quality,
                    version: ctx.version,
                    updated_at: ctx.occurred_at,
                }),
                Mutation::AdjustCitationCount {
                    source_id: e.source_id,
                    delta: 1,
                },
            ])
        }
        DomainEvent::CitationUpdated(e) => {
            let record = loaded
                .citations
                .get(&e.id)
                .ok_or(ProjectionError::MissingRecord {
                    entity: "citation",
                    id: e.id,
                })?;
            let updated = apply_changes(record, &e.changes, ctx.version, ctx.occurred_at)?;
            Ok(vec![Mutation::SaveCitation(updated)])
        }
        DomainEvent::CitationDeleted(e) => {
            let mut mutations = vec![Mutation::DeleteCitation(e.id)];
            if let Some(citation) = loaded.citations.get(&e.id) {
                mutations.push(Mutation::AdjustCitationCount {
                    source_id: citation.source_id,
                    delta: -1,
                });
            }
            Ok(mutations)
        }

        DomainEvent::MediaCreated(e) => Ok(vec![Mutation::SaveMedia(MediaRecord {
            id: e.media_id,
            title: e.title.clone(),
            file_name: e.file_name.clone(),
            mime_type: e.mime_type.clone(),
            version: ctx.version,
            updated_at: ctx.occurred_at,
        })]),
        DomainEvent::MediaUpdated(e) => {
            let record = loaded
                .media
                .get(&e.id)
                .ok_or(ProjectionError::MissingRecord {
                    entity: "media",
                    id: e.id,
                })?;
            let updated = apply_changes(record, &e.changes, ctx.version, ctx.occurred_at)?;
            Ok(vec![Mutation::SaveMedia(updated)])
        }
        DomainEvent::MediaDeleted(e) => Ok(vec![Mutation::DeleteMedia(e.id)]),

        DomainEvent::ChildLinkedToFamily(e) => {
            let record =
                loaded
                    .families
                    .get(&e.family_id)
                    .ok_or(ProjectionError::MissingRecord {
                        entity: "family",
                        id: e.family_id,
                    })?;
            let mut family = record.clone();
            if !family.children.contains(&e.person_id) {
                family.children.push(e.person_id);
            }
            family.version = ctx.version;
            family.updated_at = ctx.occurred_at;
            Ok(vec![
                Mutation::SaveFamily(family),
                Mutation::SetParentFamily {
                    person_id: e.person_id,
                    family_id: e.family_id,
                },
            ])
        }
        DomainEvent::ChildUnlinkedFromFamily(e) => {
            let record =
                loaded
                    .families
                    .get(&e.family_id)
                    .ok_or(ProjectionError::MissingRecord {
                        entity: "family",
                        id: e.family_id,
                    })?;
            let mut family = record.clone();
            family.children.retain(|child| *child != e.person_id);
            family.version = ctx.version;
            family.updated_at = ctx.occurred_at;
            Ok(vec![
                Mutation::SaveFamily(family),
                Mutation::ClearParentFamily {
                    person_id: e.person_id,
                    family_id: e.family_id,
                },
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::event::{
        ChangeSet, ChildLink, CitationCreated, EntityDeleted, FieldChange, FieldsUpdated,
        PersonCreated, SourceCreated,
    };

    fn ctx(version: i64) -> EventContext {
        EventContext {
            version,
            occurred_at: Utc::now(),
        }
    }

    fn created_person(id: Uuid) -> DomainEvent {
        DomainEvent::PersonCreated(PersonCreated {
            person_id: id,
            given_names: "Mary".into(),
            surname: "Smith".into(),
            sex: Some("F".into()),
            birth_date: Some("1832".into()),
            death_date: None,
            notes: None,
        })
    }

    fn source_record(id: Uuid, title: &str, citations: i64) -> SourceRecord {
        SourceRecord {
            id,
            title: title.into(),
            author: None,
            publication: None,
            citation_count: citations,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn person_created_builds_a_version_1_record() {
        let id = Uuid::new_v4();
        let mutations = project(&created_person(id), &ctx(1), &LoadedRecords::default()).unwrap();

        let [Mutation::SavePerson(record)] = mutations.as_slice() else {
            panic!("expected a single SavePerson, got {mutations:?}");
        };
        assert_eq!(record.id, id);
        assert_eq!(record.surname, "Smith");
        assert_eq!(record.version, 1);
        assert_eq!(record.parent_family_id, None);
    }

    #[test]
    fn person_updated_without_a_record_is_a_projection_error() {
        let id = Uuid::new_v4();
        let event = DomainEvent::PersonUpdated(FieldsUpdated {
            id,
            changes: ChangeSet::new(),
        });
        let err = project(&event, &ctx(2), &LoadedRecords::default()).unwrap_err();
        assert!(matches!(err, ProjectionError::MissingRecord { entity: "person", .. }));
    }

    #[test]
    fn person_updated_applies_the_diff_at_the_event_version() {
        let id = Uuid::new_v4();
        let mut loaded = LoadedRecords::default();
        let mutations = project(&created_person(id), &ctx(1), &loaded).unwrap();
        let Some(Mutation::SavePerson(record)) = mutations.into_iter().next() else {
            panic!("expected SavePerson");
        };
        loaded.persons.insert(id, record);

        let mut changes = ChangeSet::new();
        changes.insert(
            "surname".into(),
            FieldChange {
                old: serde_json::json!("Smith"),
                new: serde_json::json!("Jones"),
            },
        );
        let event = DomainEvent::PersonUpdated(FieldsUpdated { id, changes });
        let mutations = project(&event, &ctx(2), &loaded).unwrap();

        let [Mutation::SavePerson(updated)] = mutations.as_slice() else {
            panic!("expected SavePerson");
        };
        assert_eq!(updated.surname, "Jones");
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn citation_created_snapshots_the_source_title_and_bumps_the_count() {
        let source_id = Uuid::new_v4();
        let citation_id = Uuid::new_v4();
        let mut loaded = LoadedRecords::default();
        loaded
            .sources
            .insert(source_id, source_record(source_id, "1850 Census", 2));

        let event = DomainEvent::CitationCreated(CitationCreated {
            citation_id,
            source_id,
            page: Some("p. 4".into()),
            quality: None,
        });
        let mutations = project(&event, &ctx(1), &loaded).unwrap();

        assert_eq!(mutations.len(), 2);
        let Mutation::SaveCitation(citation) = &mutations[0] else {
            panic!("expected SaveCitation first");
        };
        assert_eq!(citation.source_title, "1850 Census");
        assert_eq!(
            mutations[1],
            Mutation::AdjustCitationCount { source_id, delta: 1 }
        );
    }

    #[test]
    fn citation_created_against_a_missing_source_snapshots_an_empty_title() {
        let event = DomainEvent::CitationCreated(CitationCreated {
            citation_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            page: None,
            quality: None,
        });
        let mutations = project(&event, &ctx(1), &LoadedRecords::default()).unwrap();

        let Mutation::SaveCitation(citation) = &mutations[0] else {
            panic!("expected SaveCitation first");
        };
        assert_eq!(citation.source_title, "");
    }

    #[test]
    fn citation_deleted_decrements_its_source() {
        let source_id = Uuid::new_v4();
        let citation_id = Uuid::new_v4();
        let mut loaded = LoadedRecords::default();
        loaded.citations.insert(
            citation_id,
            CitationRecord {
                id: citation_id,
                source_id,
                source_title: "1850 Census".into(),
                page: None,
                quality: None,
                version: 1,
                updated_at: Utc::now(),
            },
        );

        let event = DomainEvent::CitationDeleted(EntityDeleted { id: citation_id });
        let mutations = project(&event, &ctx(2), &loaded).unwrap();

        assert_eq!(
            mutations,
            vec![
                Mutation::DeleteCitation(citation_id),
                Mutation::AdjustCitationCount {
                    source_id,
                    delta: -1
                },
            ]
        );
    }

    #[test]
    fn child_link_adds_the_child_once_and_sets_the_parent_family() {
        let family_id = Uuid::new_v4();
        let person_id = Uuid::new_v4();
        let mut loaded = LoadedRecords::default();
        loaded.families.insert(
            family_id,
            FamilyRecord {
                id: family_id,
                husband_id: None,
                wife_id: None,
                marriage_date: None,
                children: vec![person_id],
                version: 2,
                updated_at: Utc::now(),
            },
        );

        let event = DomainEvent::ChildLinkedToFamily(ChildLink {
            family_id,
            person_id,
        });
        let mutations = project(&event, &ctx(3), &loaded).unwrap();

        let Mutation::SaveFamily(family) = &mutations[0] else {
            panic!("expected SaveFamily first");
        };
        // Already linked: no duplicate entry, but version still advances.
        assert_eq!(family.children, vec![person_id]);
        assert_eq!(family.version, 3);
        assert_eq!(
            mutations[1],
            Mutation::SetParentFamily {
                person_id,
                family_id
            }
        );
    }

    #[test]
    fn child_unlink_removes_the_child_and_clears_the_parent_family() {
        let family_id = Uuid::new_v4();
        let person_id = Uuid::new_v4();
        let sibling = Uuid::new_v4();
        let mut loaded = LoadedRecords::default();
        loaded.families.insert(
            family_id,
            FamilyRecord {
                id: family_id,
                husband_id: None,
                wife_id: None,
                marriage_date: None,
                children: vec![person_id, sibling],
                version: 3,
                updated_at: Utc::now(),
            },
        );

        let event = DomainEvent::ChildUnlinkedFromFamily(ChildLink {
            family_id,
            person_id,
        });
        let mutations = project(&event, &ctx(4), &loaded).unwrap();

        let Mutation::SaveFamily(family) = &mutations[0] else {
            panic!("expected SaveFamily first");
        };
        assert_eq!(family.children, vec![sibling]);
        assert_eq!(
            mutations[1],
            Mutation::ClearParentFamily {
                person_id,
                family_id
            }
        );
    }

    #[test]
    fn source_deleted_only_removes_the_source_record() {
        let id = Uuid::new_v4();
        let event = DomainEvent::SourceDeleted(EntityDeleted { id });
        let mutations = project(&event, &ctx(2), &LoadedRecords::default()).unwrap();
        assert_eq!(mutations, vec![Mutation::DeleteSource(id)]);
    }
}
