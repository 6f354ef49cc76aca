//! Backend behavior: the shared store suite run against PostgreSQL, plus
//! the rebuild path. Each test gets its own migrated database.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use lineage_core::event::{DomainEvent, FieldsUpdated, StreamType};
use lineage_core::read_model::{EntityStore, PersonRecord, SourceRecord};
use lineage_core::store::EventStore;
use lineage_store_postgres::PgStore;
use lineage_test_support as suite;

#[sqlx::test(migrations = "../../migrations")]
async fn append_assigns_contiguous_versions(pool: PgPool) {
    suite::append_assigns_contiguous_versions(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn append_rejects_stale_expected_version(pool: PgPool) {
    suite::append_rejects_stale_expected_version(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn append_rejects_invalid_batches(pool: PgPool) {
    suite::append_rejects_invalid_batches(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn read_stream_pages_without_gaps(pool: PgPool) {
    suite::read_stream_pages_without_gaps(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn out_of_range_pages_report_the_true_total(pool: PgPool) {
    suite::out_of_range_pages_report_the_true_total(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_appends_admit_exactly_one_writer(pool: PgPool) {
    suite::concurrent_appends_admit_exactly_one_writer(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_stream_reads_empty(pool: PgPool) {
    suite::unknown_stream_reads_empty(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn global_feed_orders_newest_first(pool: PgPool) {
    suite::global_feed_orders_newest_first(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn global_feed_filters_by_type(pool: PgPool) {
    suite::global_feed_filters_by_type(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn global_feed_filters_by_time(pool: PgPool) {
    let clock = Arc::new(suite::FixedClock::at(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let store = PgStore::with_clock(pool, clock.clone());
    suite::global_feed_filters_by_time(&store, &clock).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn projection_tracks_person_lifecycle(pool: PgPool) {
    suite::projection_tracks_person_lifecycle(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn citation_denormalizes_source_data(pool: PgPool) {
    suite::citation_denormalizes_source_data(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn child_links_update_both_records(pool: PgPool) {
    suite::child_links_update_both_records(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_projection_rolls_back_the_append(pool: PgPool) {
    suite::failed_projection_rolls_back_the_append(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn actor_is_recorded_on_every_event(pool: PgPool) {
    suite::actor_is_recorded_on_every_event(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_paginates_and_sorts(pool: PgPool) {
    suite::list_paginates_and_sorts(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_ranks_prefix_matches_first(pool: PgPool) {
    suite::search_ranks_prefix_matches_first(&PgStore::new(pool)).await;
}

#[sqlx::test(migrations = "../../migrations")]
async fn rebuild_reconstructs_dirty_read_models(pool: PgPool) {
    let store = PgStore::new(pool);

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
