//! Backend behavior: the shared store suite run against SQLite, plus the
//! rebuild path, which is specific to each backend's entry point.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use lineage_core::event::{DomainEvent, FieldsUpdated, StreamType};
use lineage_core::read_model::{EntityStore, PersonRecord, SourceRecord};
use lineage_core::store::EventStore;
use lineage_store_sqlite::SqliteStore;
use lineage_test_support as suite;

async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.unwrap()
}

#[tokio::test]
async fn append_assigns_contiguous_versions() {
    suite::append_assigns_contiguous_versions(&store().await).await;
}

#[tokio::test]
async fn append_rejects_stale_expected_version() {
    suite::append_rejects_stale_expected_version(&store().await).await;
}

#[tokio::test]
async fn append_rejects_invalid_batches() {
    suite::append_rejects_invalid_batches(&store().await).await;
}

#[tokio::test]
async fn read_stream_pages_without_gaps() {
    suite::read_stream_pages_without_gaps(&store().await).await;
}

#[tokio::test]
async fn out_of_range_pages_report_the_true_total() {
    suite::out_of_range_pages_report_the_true_total(&store().await).await;
}

#[tokio::test]
async fn concurrent_appends_admit_exactly_one_writer() {
    suite::concurrent_appends_admit_exactly_one_writer(&store().await).await;
}

#[tokio::test]
async fn unknown_stream_reads_empty() {
    suite::unknown_stream_reads_empty(&store().await).await;
}

#[tokio::test]
async fn global_feed_orders_newest_first() {
    suite::global_feed_orders_newest_first(&store().await).await;
}

#[tokio::test]
async fn global_feed_filters_by_type() {
    suite::global_feed_filters_by_type(&store().await).await;
}

#[tokio::test]
async fn global_feed_filters_by_time() {
    let clock = Arc::new(suite::FixedClock::at(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let store = SqliteStore::open_in_memory_with_clock(clock.clone())
        .await
        .unwrap();
    suite::global_feed_filters_by_time(&store, &clock).await;
}

#[tokio::test]
async fn projection_tracks_person_lifecycle() {
    suite::projection_tracks_person_lifecycle(&store().await).await;
}

#[tokio::test]
async fn citation_denormalizes_source_data() {
    suite::citation_denormalizes_source_data(&store().await).await;
}

#[tokio::test]
async fn child_links_update_both_records() {
    suite::child_links_update_both_records(&store().await).await;
}

#[tokio::test]
async fn failed_projection_rolls_back_the_append() {
    suite::failed_projection_rolls_back_the_append(&store().await).await;
}

#[tokio::test]
async fn actor_is_recorded_on_every_event() {
    suite::actor_is_recorded_on_every_event(&store().await).await;
}

#[tokio::test]
async fn list_paginates_and_sorts() {
    suite::list_paginates_and_sorts(&store().await).await;
}

#[tokio::test]
async fn search_ranks_prefix_matches_first() {
    suite::search_ranks_prefix_matches_first(&store().await).await;
}

#[tokio::test]
async fn rebuild_reconstructs_dirty_read_models() {
    let store = store().await;

    let person = Uuid::new_v4();
    store
        .append(
            person,
            StreamType::Person,
            0,
            &[suite::person_created(person, "Ada", "Lovelace")],
            None,
        )
        .await
        .unwrap();
    let rename = DomainEvent::PersonUpdated(FieldsUpdated {
        id: person,
        changes: suite::change(
            "surname",
            serde_json::json!("Lovelace"),
            serde_json::json!("King"),
        ),
    });
    store
        .append(person, StreamType::Person, 1, &[rename], None)
        .await
        .unwrap();
    let source = Uuid::new_v4();
    store
        .append(
            source,
            StreamType::Source,
            0,
            &[suite::source_created(source, "1850 Census")],
            None,
        )
        .await
        .unwrap();
    let citation = Uuid::new_v4();
    store
        .append(
            citation,
            StreamType::Citation,
            0,
            &[suite::citation_created(citation, source)],
            None,
        )
        .await
        .unwrap();

    // Corrupt a read model out from under the projector; only a rebuild
    // can fix it.
    let mut record: PersonRecord = store.get(person).await.unwrap();
    record.surname = "Corrupted".into();
    EntityStore::save(&store, &record).await.unwrap();

    let replayed = store.rebuild_read_models().await.unwrap();
    assert_eq!(replayed, 4);

    let record: PersonRecord = store.get(person).await.unwrap();
    assert_eq!(record.surname, "King");
    assert_eq!(record.version, 2);
    let record: SourceRecord = store.get(source).await.unwrap();
    assert_eq!(record.citation_count, 1);
}
