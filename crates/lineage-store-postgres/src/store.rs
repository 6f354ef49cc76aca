//! [`PgStore`] — the client-server implementation of [`EventStore`].

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row as _};
use uuid::Uuid;

use lineage_core::clock::{Clock, SystemClock};
use lineage_core::error::StoreError;
use lineage_core::event::{DomainEvent, StoredEvent, StreamType};
use lineage_core::store::{EventStore, GlobalFilter, GlobalSlice, StreamSlice, validate_batch};
use lineage_projection::{EventContext, project, required_reads};

use crate::apply::{apply_mutation, load_records};

/// Embedded migrations, applied by [`PgStore::connect`].
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const EVENT_COLS: &str = "global_position, event_id, stream_id, stream_type, version, \
                          event_type, payload, actor, occurred_at";

/// Outcome of one append attempt. A `Race` means a concurrent writer hit
/// the `UNIQUE (stream_id, version)` constraint after our version check
/// passed; the caller re-reads the stream head to report the real version.
enum TryAppendError {
    Race,
    Store(StoreError),
}

impl From<sqlx::Error> for TryAppendError {
    fn from(err: sqlx::Error) -> Self {
        let unique = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if unique {
            TryAppendError::Race
        } else {
            TryAppendError::Store(StoreError::storage(err))
        }
    }
}

/// A Lineage store backed by a PostgreSQL pool.
///
/// Cloning is cheap — the pool is reference-counted.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgStore {
    /// Connect to `database_url` and run pending migrations.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] if the connection or a migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(StoreError::storage)?;
        MIGRATOR.run(&pool).await.map_err(StoreError::storage)?;
        Ok(Self::new(pool))
    }

    /// Wrap an existing pool. Migrations are assumed to have run.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Wrap an existing pool with an injected clock. Tests use this with a
    /// fixed clock so `occurred_at` is deterministic.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn stream_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        let row =
            sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM events WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::storage)?;
        row.try_get("version").map_err(StoreError::storage)
    }

    async fn try_append(
        &self,
        stream_id: Uuid,
        stream_type: StreamType,
        expected_version: i64,
        events: &[DomainEvent],
        actor: Option<&str>,
    ) -> Result<i64, TryAppendError> {
        let occurred_at = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(StoreError::storage).map_err(TryAppendError::Store)?;

        let actual: i64 =
            sqlx::query("SELECT COALESCE(MAX(version), 0) AS version FROM events WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("version")
                .map_err(|e| TryAppendError::Store(StoreError::storage(e)))?;
        if actual != expected_version {
            return Err(TryAppendError::Store(StoreError::VersionConflict {
                stream_id,
                expected: expected_version,
                actual,
            }));
        }

        let mut version = expected_version;
        for event in events {
            version += 1;
            let payload = event.payload().map_err(TryAppendError::Store)?;
            sqlx::query(
                "INSERT INTO events \
                 (event_id, stream_id, stream_type, version, event_type, payload, actor, occurred_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::new_v4())
            .bind(stream_id)
            .bind(stream_type.as_str())
            .bind(version)
            .bind(event.event_type())
            .bind(&payload)
            .bind(actor)
            .bind(occurred_at)
            .execute(&mut *tx)
            .await?;

            let ctx = EventContext {
                version,
                occurred_at,
            };
            let loaded = load_records(&mut tx, &required_reads(event))
                .await
                .map_err(TryAppendError::Store)?;
            let mutations = project(event, &ctx, &loaded)
                .map_err(|e| TryAppendError::Store(e.into()))?;
            for mutation in &mutations {
                apply_mutation(&mut tx, mutation)
                    .await
                    .map_err(TryAppendError::Store)?;
            }
        }

        tx.commit().await?;
        Ok(version)
    }

    /// Rebuilds every read-model table by replaying the full event log
    /// from position 0, in one transaction. Returns the number of events
    /// replayed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Decode`] if a stored event no longer decodes;
    /// [`StoreError::Projection`] if a replayed projection fails;
    /// [`StoreError::Storage`] on backend failure.
    pub async fn rebuild_read_models(&self) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::storage)?;

        for table in ["persons", "families", "sources", "citations", "media"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(StoreError::storage)?;
        }

        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLS} FROM events ORDER BY global_position ASC"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::storage)?;

        let mut replayed: u64 = 0;
        for row in &rows {
            let stored = event_from_row(row)?;
            let event = stored.to_domain()?;
            let ctx = EventContext {
                version: stored.version,
                occurred_at: stored.occurred_at,
            };
            let loaded = load_records(&mut tx, &required_reads(&event)).await?;
            let mutations = project(&event, &ctx, &loaded).map_err(StoreError::from)?;
            for mutation in &mutations {
                apply_mutation(&mut tx, mutation).await?;
            }
            replayed += 1;
        }

        tx.commit().await.map_err(StoreError::storage)?;
        tracing::info!(replayed, "read models rebuilt from event log");
        Ok(replayed)
    }
}

/// Builds a [`StoredEvent`] from a row selected with the full event
/// column list.
fn event_from_row(row: &PgRow) -> Result<StoredEvent, StoreError> {
    let stream_type_name: String = row.try_get("stream_type").map_err(StoreError::storage)?;
    let stream_type = StreamType::parse(&stream_type_name)?;
    Ok(StoredEvent {
        global_position: row.try_get("global_position").map_err(StoreError::storage)?,
        event_id: row.try_get("event_id").map_err(StoreError::storage)?,
        stream_id: row.try_get("stream_id").map_err(StoreError::storage)?,
        stream_type,
        version: row.try_get("version").map_err(StoreError::storage)?,
        event_type: row.try_get("event_type").map_err(StoreError::storage)?,
        payload: row.try_get("payload").map_err(StoreError::storage)?,
        actor: row.try_get("actor").map_err(StoreError::storage)?,
        occurred_at: row.try_get("occurred_at").map_err(StoreError::storage)?,
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn append(
        &self,
        stream_id: Uuid,
        stream_type: StreamType,
        expected_version: i64,
        events: &[DomainEvent],
        actor: Option<String>,
    ) -> Result<i64, StoreError> {
        validate_batch(stream_id, stream_type, expected_version, events)?;

        match self
            .try_append(stream_id, stream_type, expected_version, events, actor.as_deref())
            .await
        {
            Ok(new_version) => {
                tracing::debug!(
                    %stream_id,
                    stream_type = stream_type.as_str(),
                    new_version,
                    "appended events"
                );
                Ok(new_version)
            }
            // Lost a race after the version check passed: the constraint
            // fired, so the head moved. Report where it moved to.
            Err(TryAppendError::Race) => {
                let actual = self.stream_version(stream_id).await?;
                Err(StoreError::VersionConflict {
                    stream_id,
                    expected: expected_version,
                    actual,
                })
            }
            Err(TryAppendError::Store(err)) => Err(err),
        }
    }

    async fn read_stream(
        &self,
        stream_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<StreamSlice, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLS}, COUNT(*) OVER () AS total \
             FROM events WHERE stream_id = $1 \
             ORDER BY version DESC LIMIT $2 OFFSET $3"
        ))
        .bind(stream_id)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::storage)?;

        // A page past the end has no window row to take the count from;
        // the total must still reflect the stream.
        let total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("total").map_err(StoreError::storage)?,
            None => sqlx::query("SELECT COUNT(*) AS total FROM events WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::storage)?
                .try_get("total")
                .map_err(StoreError::storage)?,
        };
        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StreamSlice { events, total })
    }

    async fn read_global(&self, filter: &GlobalFilter) -> Result<GlobalSlice, StoreError> {
        let offset = filter.offset.max(0);
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLS}, COUNT(*) OVER () AS total FROM events \
             WHERE ($1::timestamptz IS NULL OR occurred_at >= $1) \
               AND ($2::timestamptz IS NULL OR occurred_at <= $2) \
               AND (cardinality($3::text[]) = 0 OR event_type = ANY($3)) \
             ORDER BY occurred_at DESC, global_position DESC \
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.event_types)
        .bind(filter.limit.max(0))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::storage)?;

        let total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("total").map_err(StoreError::storage)?,
            None => sqlx::query(
                "SELECT COUNT(*) AS total FROM events \
                 WHERE ($1::timestamptz IS NULL OR occurred_at >= $1) \
                   AND ($2::timestamptz IS NULL OR occurred_at <= $2) \
                   AND (cardinality($3::text[]) = 0 OR event_type = ANY($3))",
            )
            .bind(filter.from)
            .bind(filter.to)
            .bind(&filter.event_types)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::storage)?
            .try_get("total")
            .map_err(StoreError::storage)?,
        };
        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let has_more = offset + i64::try_from(events.len()).unwrap_or(0) < total;

        Ok(GlobalSlice {
            events,
            total,
            has_more,
        })
    }
}
