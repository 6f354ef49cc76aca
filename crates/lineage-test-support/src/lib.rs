//! Fixtures and the shared behavior suite both storage backends must pass.
//!
//! The suite functions are written against the [`EventStore`] and
//! [`ReadModelStore`] contracts only, so each backend's integration tests
//! call the same functions and any behavioral drift between the engines
//! shows up as a test failure.

#![allow(clippy::missing_panics_doc)]

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use lineage_core::clock::Clock;
use lineage_core::error::StoreError;
use lineage_core::event::{
    ChangeSet, ChildLink, CitationCreated, DomainEvent, EntityDeleted, FamilyCreated, FieldChange,
    FieldsUpdated, MediaCreated, PersonCreated, SourceCreated, StreamType,
};
use lineage_core::read_model::{
    CitationRecord, EntityStore, ListOptions, Listed, PersonRecord, ReadModelStore, SortOrder,
    SourceRecord,
};
use lineage_core::store::{EventStore, GlobalFilter};

/// A clock pinned to a fixed instant, advanced explicitly by tests.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// A clock pinned at `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ── Event fixtures ───────────────────────────────────────────────────────

/// A `PersonCreated` for `id` with a distinctive name.
#[must_use]
pub fn person_created(id: Uuid, given_names: &str, surname: &str) -> DomainEvent {
    DomainEvent::PersonCreated(PersonCreated {
        person_id: id,
        given_names: given_names.into(),
        surname: surname.into(),
        sex: None,
        birth_date: None,
        death_date: None,
        notes: None,
    })
}

/// A `FamilyCreated` for `id` with no spouses.
#[must_use]
pub fn family_created(id: Uuid) -> DomainEvent {
    DomainEvent::FamilyCreated(FamilyCreated {
        family_id: id,
        husband_id: None,
        wife_id: None,
        marriage_date: None,
    })
}

/// A `SourceCreated` for `id` titled `title`.
#[must_use]
pub fn source_created(id: Uuid, title: &str) -> DomainEvent {
    DomainEvent::SourceCreated(SourceCreated {
        source_id: id,
        title: title.into(),
        author: None,
        publication: None,
    })
}

/// A `CitationCreated` linking `citation_id` to `source_id`.
#[must_use]
pub fn citation_created(citation_id: Uuid, source_id: Uuid) -> DomainEvent {
    DomainEvent::CitationCreated(CitationCreated {
        citation_id,
        source_id,
        page: Some("p. 1".into()),
        quality: Some(2),
    })
}

/// A `MediaCreated` for `id`.
#[must_use]
pub fn media_created(id: Uuid, title: &str) -> DomainEvent {
    DomainEvent::MediaCreated(MediaCreated {
        media_id: id,
        title: title.into(),
        file_name: format!("{title}.jpg"),
        mime_type: Some("image/jpeg".into()),
    })
}

/// A one-field [`ChangeSet`].
#[must_use]
pub fn change(field: &str, old: serde_json::Value, new: serde_json::Value) -> ChangeSet {
    let mut changes = ChangeSet::new();
    changes.insert(field.into(), FieldChange { old, new });
    changes
}

async fn seed_person<S: EventStore + ?Sized>(store: &S, given: &str, surname: &str) -> Uuid {
    let id = Uuid::new_v4();
    store
        .append(
            id,
            StreamType::Person,
            0,
            &[person_created(id, given, surname)],
            None,
        )
        .await
        .unwrap();
    id
}

// ── Event log behavior ───────────────────────────────────────────────────

/// Appends assign contiguous versions starting at 1, per stream.
pub async fn append_assigns_contiguous_versions<S: EventStore>(store: &S) {
    let id = Uuid::new_v4();

    let v1 = store
        .append(
            id,
            StreamType::Person,
            0,
            &[person_created(id, "Ada", "Lovelace")],
            None,
        )
        .await
        .unwrap();
    assert_eq!(v1, 1);

    let batch = [
        DomainEvent::PersonUpdated(FieldsUpdated {
            id,
            changes: change("surname", serde_json::json!("Lovelace"), serde_json::json!("King")),
        }),
        DomainEvent::PersonUpdated(FieldsUpdated {
            id,
            changes: change("surname", serde_json::json!("King"), serde_json::json!("Byron")),
        }),
    ];
    let v3 = store
        .append(id, StreamType::Person, 1, &batch, None)
        .await
        .unwrap();
    assert_eq!(v3, 3);

    let slice = store.read_stream(id, 10, 0).await.unwrap();
    assert_eq!(slice.total, 3);
    let versions: Vec<i64> = slice.events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);
}

/// A stale `expected_version` is rejected with the stream's real version,
/// and nothing is written.
pub async fn append_rejects_stale_expected_version<S: EventStore>(store: &S) {
    let id = seed_person(store, "Ada", "Lovelace").await;

    let err = store
        .append(
            id,
            StreamType::Person,
            0,
            &[person_created(id, "Ada", "Lovelace")],
            None,
        )
        .await
        .unwrap_err();
    let StoreError::VersionConflict {
        stream_id,
        expected,
        actual,
    } = err
    else {
        panic!("expected VersionConflict, got {err:?}");
    };
    assert_eq!(stream_id, id);
    assert_eq!(expected, 0);
    assert_eq!(actual, 1);

    let slice = store.read_stream(id, 10, 0).await.unwrap();
    assert_eq!(slice.total, 1);
}

/// Structurally invalid batches are rejected before anything is written.
pub async fn append_rejects_invalid_batches<S: EventStore>(store: &S) {
    let id = Uuid::new_v4();

    let err = store
        .append(id, StreamType::Person, 0, &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "{err:?}");

    // Event targets a different stream id.
    let other = Uuid::new_v4();
    let err = store
        .append(
            id,
            StreamType::Person,
            0,
            &[person_created(other, "Ada", "Lovelace")],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "{err:?}");

    // Event type does not belong to the declared stream type.
    let err = store
        .append(
            id,
            StreamType::Source,
            0,
            &[person_created(id, "Ada", "Lovelace")],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "{err:?}");

    assert_eq!(store.read_stream(id, 10, 0).await.unwrap().total, 0);
}

/// Stream reads page newest-first with a stable total and no gaps.
pub async fn read_stream_pages_without_gaps<S: EventStore>(store: &S) {
    let id = Uuid::new_v4();
    store
        .append(
            id,
            StreamType::Person,
            0,
            &[person_created(id, "Ada", "Lovelace")],
            None,
        )
        .await
        .unwrap();
    for version in 1..5 {
        let event = DomainEvent::PersonUpdated(FieldsUpdated {
            id,
            changes: change(
                "notes",
                serde_json::Value::Null,
                serde_json::json!(format!("rev {version}")),
            ),
        });
        store
            .append(id, StreamType::Person, version, &[event], None)
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    for page in 0..3 {
        let slice = store.read_stream(id, 2, page * 2).await.unwrap();
        assert_eq!(slice.total, 5);
        seen.extend(slice.events.iter().map(|e| e.version));
    }
    assert_eq!(seen, vec![5, 4, 3, 2, 1]);
}

/// Paging past the end of a result set still reports the true totals:
/// the same logical query must answer the same total at every offset.
pub async fn out_of_range_pages_report_the_true_total<S: EventStore + ReadModelStore>(store: &S) {
    let id = seed_person(store, "Ada", "Lovelace").await;

    let slice = store.read_stream(id, 10, 5).await.unwrap();
    assert!(slice.events.is_empty());
    assert_eq!(slice.total, 1);

    let feed = store
        .read_global(&GlobalFilter {
            limit: 10,
            offset: 5,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert!(feed.events.is_empty());
    assert_eq!(feed.total, 1);
    assert!(!feed.has_more);

    let filtered = store
        .read_global(&GlobalFilter {
            event_types: vec!["PersonCreated".into()],
            limit: 10,
            offset: 5,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);

    let page: Listed<PersonRecord> = store
        .list(&ListOptions {
            limit: 10,
            offset: 5,
            ..ListOptions::default()
        })
        .await
        .unwrap();
    assert!(page.records.is_empty());
    assert_eq!(page.total, 1);
}

/// Two appends racing at the same expected version admit exactly one
/// writer; the loser learns where the head moved to.
pub async fn concurrent_appends_admit_exactly_one_writer<S: EventStore>(store: &S) {
    let id = Uuid::new_v4();
    let event = person_created(id, "Ada", "Lovelace");

    let (first, second) = tokio::join!(
        store.append(id, StreamType::Person, 0, std::slice::from_ref(&event), None),
        store.append(id, StreamType::Person, 0, std::slice::from_ref(&event), None),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    for outcome in outcomes {
        match outcome {
            Ok(version) => assert_eq!(version, 1),
            Err(StoreError::VersionConflict {
                stream_id,
                expected,
                actual,
            }) => {
                assert_eq!(stream_id, id);
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            Err(err) => panic!("expected VersionConflict, got {err:?}"),
        }
    }

    assert_eq!(store.read_stream(id, 10, 0).await.unwrap().total, 1);
}

/// Reading an unknown stream yields an empty slice, not an error.
pub async fn unknown_stream_reads_empty<S: EventStore>(store: &S) {
    let slice = store.read_stream(Uuid::new_v4(), 10, 0).await.unwrap();
    assert!(slice.events.is_empty());
    assert_eq!(slice.total, 0);
}

/// Global positions are strictly increasing across streams and the feed
/// comes back newest-first.
pub async fn global_feed_orders_newest_first<S: EventStore>(store: &S) {
    let person = seed_person(store, "Ada", "Lovelace").await;
    let source = Uuid::new_v4();
    store
        .append(
            source,
            StreamType::Source,
            0,
            &[source_created(source, "1850 Census")],
            None,
        )
        .await
        .unwrap();
    store
        .append(
            person,
            StreamType::Person,
            1,
            &[DomainEvent::PersonDeleted(EntityDeleted { id: person })],
            None,
        )
        .await
        .unwrap();

    let slice = store
        .read_global(&GlobalFilter {
            limit: 10,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(slice.total, 3);
    assert!(!slice.has_more);

    let positions: Vec<i64> = slice.events.iter().map(|e| e.global_position).collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(positions, sorted, "feed must be newest first");
    assert_eq!(slice.events[0].event_type, "PersonDeleted");
}

/// The global feed honors event-type filters and reports `has_more`.
pub async fn global_feed_filters_by_type<S: EventStore>(store: &S) {
    for i in 0..3 {
        seed_person(store, "Person", &format!("Number{i}")).await;
    }
    let source = Uuid::new_v4();
    store
        .append(
            source,
            StreamType::Source,
            0,
            &[source_created(source, "Parish register")],
            None,
        )
        .await
        .unwrap();

    let slice = store
        .read_global(&GlobalFilter {
            event_types: vec!["PersonCreated".into()],
            limit: 2,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(slice.total, 3);
    assert_eq!(slice.events.len(), 2);
    assert!(slice.has_more);
    assert!(slice.events.iter().all(|e| e.event_type == "PersonCreated"));

    let rest = store
        .read_global(&GlobalFilter {
            event_types: vec!["PersonCreated".into()],
            limit: 2,
            offset: 2,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(rest.events.len(), 1);
    assert!(!rest.has_more);
}

/// The global feed honors an `occurred_at` window. Needs the store to be
/// running on `clock`.
pub async fn global_feed_filters_by_time<S: EventStore>(store: &S, clock: &FixedClock) {
    seed_person(store, "Early", "Entry").await;
    clock.advance(Duration::hours(2));
    let cutoff = clock.now() - Duration::hours(1);
    seed_person(store, "Late", "Entry").await;

    let slice = store
        .read_global(&GlobalFilter {
            from: Some(cutoff),
            limit: 10,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(slice.total, 1);

    let slice = store
        .read_global(&GlobalFilter {
            to: Some(cutoff),
            limit: 10,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(slice.total, 1);
}

// ── Projection behavior ──────────────────────────────────────────────────

/// Create, update, and delete events keep the person read model in step
/// with the stream.
pub async fn projection_tracks_person_lifecycle<S: EventStore + ReadModelStore>(store: &S) {
    let id = seed_person(store, "Ada", "Lovelace").await;

    let person: PersonRecord = store.get(id).await.unwrap();
    assert_eq!(person.surname, "Lovelace");
    assert_eq!(person.version, 1);

    let event = DomainEvent::PersonUpdated(FieldsUpdated {
        id,
        changes: change("surname", serde_json::json!("Lovelace"), serde_json::json!("King")),
    });
    store
        .append(id, StreamType::Person, 1, &[event], None)
        .await
        .unwrap();
    let person: PersonRecord = store.get(id).await.unwrap();
    assert_eq!(person.surname, "King");
    assert_eq!(person.version, 2);

    store
        .append(
            id,
            StreamType::Person,
            2,
            &[DomainEvent::PersonDeleted(EntityDeleted { id })],
            None,
        )
        .await
        .unwrap();
    let err = EntityStore::<PersonRecord>::get(store, id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");

    // The log keeps the full history past the delete.
    assert_eq!(store.read_stream(id, 10, 0).await.unwrap().total, 3);
}

/// Citations maintain the source's count and snapshot its title; the
/// snapshot is not retroactively updated by a source rename.
pub async fn citation_denormalizes_source_data<S: EventStore + ReadModelStore>(store: &S) {
    let source_id = Uuid::new_v4();
    store
        .append(
            source_id,
            StreamType::Source,
            0,
            &[source_created(source_id, "1850 Census")],
            None,
        )
        .await
        .unwrap();

    let citation_id = Uuid::new_v4();
    store
        .append(
            citation_id,
            StreamType::Citation,
            0,
            &[citation_created(citation_id, source_id)],
            None,
        )
        .await
        .unwrap();

    let source: SourceRecord = store.get(source_id).await.unwrap();
    assert_eq!(source.citation_count, 1);
    // The count is denormalized from another stream; the source's own
    // version must not move.
    assert_eq!(source.version, 1);

    let citation: CitationRecord = store.get(citation_id).await.unwrap();
    assert_eq!(citation.source_title, "1850 Census");

    let rename = DomainEvent::SourceUpdated(FieldsUpdated {
        id: source_id,
        changes: change(
            "title",
            serde_json::json!("1850 Census"),
            serde_json::json!("1850 US Federal Census"),
        ),
    });
    store
        .append(source_id, StreamType::Source, 1, &[rename], None)
        .await
        .unwrap();
    let citation: CitationRecord = store.get(citation_id).await.unwrap();
    assert_eq!(citation.source_title, "1850 Census");

    store
        .append(
            citation_id,
            StreamType::Citation,
            1,
            &[DomainEvent::CitationDeleted(EntityDeleted { id: citation_id })],
            None,
        )
        .await
        .unwrap();
    let source: SourceRecord = store.get(source_id).await.unwrap();
    assert_eq!(source.citation_count, 0);
}

/// Linking a child updates both the family's child list and the person's
/// parent family pointer; unlinking reverses both.
pub async fn child_links_update_both_records<S: EventStore + ReadModelStore>(store: &S) {
    let child = seed_person(store, "Byron", "King").await;
    let family_id = Uuid::new_v4();
    store
        .append(
            family_id,
            StreamType::Family,
            0,
            &[family_created(family_id)],
            None,
        )
        .await
        .unwrap();

    let link = DomainEvent::ChildLinkedToFamily(ChildLink {
        family_id,
        person_id: child,
    });
    store
        .append(family_id, StreamType::Family, 1, &[link], None)
        .await
        .unwrap();

    let family: lineage_core::read_model::FamilyRecord = store.get(family_id).await.unwrap();
    assert_eq!(family.children, vec![child]);
    assert_eq!(family.version, 2);
    let person: PersonRecord = store.get(child).await.unwrap();
    assert_eq!(person.parent_family_id, Some(family_id));
    assert_eq!(person.version, 1);

    let unlink = DomainEvent::ChildUnlinkedFromFamily(ChildLink {
        family_id,
        person_id: child,
    });
    store
        .append(family_id, StreamType::Family, 2, &[unlink], None)
        .await
        .unwrap();

    let family: lineage_core::read_model::FamilyRecord = store.get(family_id).await.unwrap();
    assert!(family.children.is_empty());
    let person: PersonRecord = store.get(child).await.unwrap();
    assert_eq!(person.parent_family_id, None);
}

/// A failed projection rolls back the events appended alongside it.
pub async fn failed_projection_rolls_back_the_append<S: EventStore + ReadModelStore>(store: &S) {
    let id = Uuid::new_v4();
    // An update as the first event of a stream: valid structurally, but
    // there is no record to apply the diff to.
    let event = DomainEvent::PersonUpdated(FieldsUpdated {
        id,
        changes: change("surname", serde_json::Value::Null, serde_json::json!("King")),
    });
    let err = store
        .append(id, StreamType::Person, 0, &[event], None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Projection(_)), "{err:?}");

    assert_eq!(store.read_stream(id, 10, 0).await.unwrap().total, 0);
    let slice = store
        .read_global(&GlobalFilter {
            limit: 10,
            ..GlobalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(slice.total, 0);
}

/// Actor attribution is recorded per batch and may be absent.
pub async fn actor_is_recorded_on_every_event<S: EventStore>(store: &S) {
    let id = Uuid::new_v4();
    store
        .append(
            id,
            StreamType::Person,
            0,
            &[person_created(id, "Ada", "Lovelace")],
            Some("margaret".into()),
        )
        .await
        .unwrap();
    store
        .append(
            id,
            StreamType::Person,
            1,
            &[DomainEvent::PersonDeleted(EntityDeleted { id })],
            None,
        )
        .await
        .unwrap();

    let slice = store.read_stream(id, 10, 0).await.unwrap();
    assert_eq!(slice.events[0].actor, None);
    assert_eq!(slice.events[1].actor.as_deref(), Some("margaret"));
}

// ── Read-model query behavior ────────────────────────────────────────────

/// Lists paginate with a consistent total and honor the sort whitelist.
pub async fn list_paginates_and_sorts<S: EventStore + ReadModelStore>(store: &S) {
    for surname in ["Carter", "Abbott", "Baker"] {
        seed_person(store, "Test", surname).await;
    }

    let page: Listed<PersonRecord> = store
        .list(&ListOptions {
            limit: 2,
            ..ListOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let surnames: Vec<&str> = page.records.iter().map(|p| p.surname.as_str()).collect();
    assert_eq!(surnames, vec!["Abbott", "Baker"]);

    let rest: Listed<PersonRecord> = store
        .list(&ListOptions {
            limit: 2,
            offset: 2,
            ..ListOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(rest.records.len(), 1);
    assert_eq!(rest.records[0].surname, "Carter");

    let descending: Listed<PersonRecord> = store
        .list(&ListOptions {
            limit: 10,
            sort_by: Some("surname".into()),
            order: SortOrder::Descending,
            ..ListOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(descending.records[0].surname, "Carter");

    // An unrecognized sort key falls back to the default ordering instead
    // of reaching the SQL layer.
    let fallback: Listed<PersonRecord> = store
        .list(&ListOptions {
            limit: 10,
            sort_by: Some("surname; DROP TABLE persons".into()),
            ..ListOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(fallback.records[0].surname, "Abbott");
}

/// Search is case-insensitive, escapes wildcards, and ranks prefix matches
/// first.
pub async fn search_ranks_prefix_matches_first<S: EventStore + ReadModelStore>(store: &S) {
    seed_person(store, "Anne", "Anning").await;
    seed_person(store, "Mary", "Anning").await;
    seed_person(store, "Ann", "Mara").await;

    let hits: Vec<PersonRecord> = store.search("ann", 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    // "Ann Mara" and "Anne Anning" match at the start of the label; "Mary
    // Anning" only matches mid-string and must come last.
    assert_eq!(hits[2].given_names, "Mary");

    let hits: Vec<PersonRecord> = store.search("MARY ANN", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].given_names, "Mary");

    // LIKE metacharacters in the query are literals, not wildcards.
    let hits: Vec<PersonRecord> = store.search("%", 10).await.unwrap();
    assert!(hits.is_empty());
}
