//! [`SqliteStore`] — the embedded implementation of [`EventStore`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;
use rusqlite::types::{Type, Value};
use uuid::Uuid;

use lineage_core::clock::{Clock, SystemClock};
use lineage_core::error::StoreError;
use lineage_core::event::{DomainEvent, StoredEvent, StreamType};
use lineage_core::store::{
    EventStore, GlobalFilter, GlobalSlice, StreamSlice, validate_batch,
};
use lineage_projection::{EventContext, project, required_reads};

use crate::apply::{apply_mutation, load_records};
use crate::encode::encode_dt;
use crate::err::{abort, call_err};
use crate::schema::SCHEMA;

/// A Lineage store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. The
/// connection serializes all access, so the append path's version check
/// cannot race another writer.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: tokio_rusqlite::Connection,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialization.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] if the file cannot be opened or the schema
    /// cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, Arc::new(SystemClock)).await
    }

    /// Open a store with an injected clock. Tests use this with a fixed
    /// clock so `occurred_at` is deterministic.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] if the file cannot be opened or the schema
    /// cannot be applied.
    pub async fn open_with_clock(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(call_err)?;
        let store = Self { conn, clock };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store — useful for testing.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] if the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open_in_memory_with_clock(Arc::new(SystemClock)).await
    }

    /// Open an in-memory store with an injected clock.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] if the schema cannot be applied.
    pub async fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(call_err)?;
        let store = Self { conn, clock };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(call_err)
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
        let replayed = self
            .conn
            .call(|conn| {
                let tx = conn.transaction()?;
                for table in ["persons", "families", "sources", "citations", "media"] {
                    tx.execute(&format!("DELETE FROM {table}"), [])?;
                }

                let rows = {
                    let mut stmt = tx.prepare(
                        "SELECT global_position, event_id, stream_id, stream_type, version, \
                         event_type, payload, actor, occurred_at \
                         FROM events ORDER BY global_position ASC",
                    )?;
                    stmt.query_map([], event_from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                };

                let mut replayed: u64 = 0;
                for stored in rows {
                    let event = stored.to_domain().map_err(abort)?;
                    let ctx = EventContext {
                        version: stored.version,
                        occurred_at: stored.occurred_at,
                    };
                    let loaded = load_records(&tx, &required_reads(&event))?;
                    let mutations =
                        project(&event, &ctx, &loaded).map_err(|e| abort(e.into()))?;
                    for mutation in &mutations {
                        apply_mutation(&tx, mutation)?;
                    }
                    replayed += 1;
                }

                tx.commit()?;
                Ok(replayed)
            })
            .await
            .map_err(call_err)?;

        tracing::info!(replayed, "read models rebuilt from event log");
        Ok(replayed)
    }
}

/// Builds a [`StoredEvent`] from a row selected with the full event
/// column list.
fn event_from_row(row: &rusqlite::Row<'_>) -> Result<StoredEvent, rusqlite::Error> {
    let stream_type_name: String = row.get("stream_type")?;
    let stream_type = StreamType::parse(&stream_type_name)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(StoredEvent {
        global_position: row.get("global_position")?,
        event_id: crate::encode::decode_uuid(1, &row.get::<_, String>("event_id")?)?,
        stream_id: crate::encode::decode_uuid(2, &row.get::<_, String>("stream_id")?)?,
        stream_type,
        version: row.get("version")?,
        event_type: row.get("event_type")?,
        payload,
        actor: row.get("actor")?,
        occurred_at: crate::encode::decode_dt(8, &row.get::<_, String>("occurred_at")?)?,
    })
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(
        &self,
        stream_id: Uuid,
        stream_type: StreamType,
        expected_version: i64,
        events: &[DomainEvent],
        actor: Option<String>,
    ) -> Result<i64, StoreError> {
        validate_batch(stream_id, stream_type, expected_version, events)?;

        let batch = events.to_vec();
        let occurred_at = self.clock.now();
        let occurred_at_text = encode_dt(occurred_at);

        let new_version = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let actual: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(version), 0) FROM events WHERE stream_id = ?1",
                    params![stream_id.to_string()],
                    |row| row.get(0),
                )?;
                if actual != expected_version {
                    return Err(abort(StoreError::VersionConflict {
                        stream_id,
                        expected: expected_version,
                        actual,
                    }));
                }

                let mut version = expected_version;
                for event in &batch {
                    version += 1;
                    let payload = event.payload().map_err(abort)?;
                    tx.execute(
                        "INSERT INTO events \
                         (event_id, stream_id, stream_type, version, event_type, payload, actor, occurred_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            Uuid::new_v4().to_string(),
                            stream_id.to_string(),
                            stream_type.as_str(),
                            version,
                            event.event_type(),
                            payload.to_string(),
                            actor,
                            occurred_at_text,
                        ],
                    )?;

                    let ctx = EventContext {
                        version,
                        occurred_at,
                    };
                    let loaded = load_records(&tx, &required_reads(event))?;
                    let mutations =
                        project(event, &ctx, &loaded).map_err(|e| abort(e.into()))?;
                    for mutation in &mutations {
                        apply_mutation(&tx, mutation)?;
                    }
                }

                tx.commit()?;
                Ok(version)
            })
            .await
            .map_err(call_err)?;

        tracing::debug!(
            %stream_id,
            stream_type = stream_type.as_str(),
            new_version,
            "appended events"
        );
        Ok(new_version)
    }

    async fn read_stream(
        &self,
        stream_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<StreamSlice, StoreError> {
        let limit = limit.max(0);
        let offset = offset.max(0);

        let (rows, total) = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT global_position, event_id, stream_id, stream_type, version, \
                     event_type, payload, actor, occurred_at, COUNT(*) OVER () AS total \
                     FROM events WHERE stream_id = ?1 \
                     ORDER BY version DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![stream_id.to_string(), limit, offset], |row| {
                        Ok((event_from_row(row)?, row.get::<_, i64>("total")?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                // A page past the end has no window row to take the count
                // from; the total must still reflect the stream.
                let total = match rows.first() {
                    Some((_, total)) => *total,
                    None => conn.query_row(
                        "SELECT COUNT(*) FROM events WHERE stream_id = ?1",
                        params![stream_id.to_string()],
                        |row| row.get(0),
                    )?,
                };
                Ok((rows, total))
            })
            .await
            .map_err(call_err)?;

        Ok(StreamSlice {
            events: rows.into_iter().map(|(event, _)| event).collect(),
            total,
        })
    }

    async fn read_global(&self, filter: &GlobalFilter) -> Result<GlobalSlice, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(from) = filter.from {
            values.push(Value::Text(encode_dt(from)));
            clauses.push(format!("occurred_at >= ?{}", values.len()));
        }
        if let Some(to) = filter.to {
            values.push(Value::Text(encode_dt(to)));
            clauses.push(format!("occurred_at <= ?{}", values.len()));
        }
        if !filter.event_types.is_empty() {
            let mut placeholders = Vec::with_capacity(filter.event_types.len());
            for event_type in &filter.event_types {
                values.push(Value::Text(event_type.clone()));
                placeholders.push(format!("?{}", values.len()));
            }
            clauses.push(format!("event_type IN ({})", placeholders.join(", ")));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let count_sql = format!("SELECT COUNT(*) FROM events{where_sql}");
        let count_values = values.clone();

        values.push(Value::Integer(filter.limit.max(0)));
        let limit_placeholder = values.len();
        values.push(Value::Integer(filter.offset.max(0)));
        let offset_placeholder = values.len();

        let sql = format!(
            "SELECT global_position, event_id, stream_id, stream_type, version, \
             event_type, payload, actor, occurred_at, COUNT(*) OVER () AS total \
             FROM events{where_sql} \
             ORDER BY occurred_at DESC, global_position DESC \
             LIMIT ?{limit_placeholder} OFFSET ?{offset_placeholder}"
        );
        let offset = filter.offset.max(0);

        let (rows, total) = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| {
                        Ok((event_from_row(row)?, row.get::<_, i64>("total")?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                let total = match rows.first() {
                    Some((_, total)) => *total,
                    None => conn.query_row(
                        &count_sql,
                        rusqlite::params_from_iter(count_values),
                        |row| row.get(0),
                    )?,
                };
                Ok((rows, total))
            })
            .await
            .map_err(call_err)?;

        let events: Vec<StoredEvent> = rows.into_iter().map(|(event, _)| event).collect();
        let has_more = offset + i64::try_from(events.len()).unwrap_or(0) < total;
        Ok(GlobalSlice {
            events,
            total,
            has_more,
        })
    }
}
