//! Read-model persistence: one [`SqliteEntity`] mapping per record type
//! and a single generic [`EntityStore`] implementation over them.

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension as _, params, params_from_iter};
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::read_model::{
    CitationRecord, EntityStore, FamilyRecord, ListOptions, Listed, MediaRecord, PersonRecord,
    ReadModel, SortOrder, SourceRecord,
};

use crate::encode::{
    decode_dt, decode_opt_uuid, decode_uuid, decode_uuid_list, encode_dt, encode_uuid_list,
    escape_like,
};
use crate::err::call_err;
use crate::store::SqliteStore;

/// Per-entity SQL mapping. The generic [`EntityStore`] impl and the
/// in-transaction projection helpers are written once against this.
pub(crate) trait SqliteEntity: ReadModel {
    /// Table name.
    const TABLE: &'static str;
    /// Column list matching [`SqliteEntity::from_row`].
    const SELECT_COLS: &'static str;
    /// Upsert statement matching [`SqliteEntity::bind_params`].
    const INSERT_SQL: &'static str;
    /// SQL expression searched over by [`EntityStore::search`].
    const SEARCH_EXPR: &'static str;
    /// Default ordering column for lists and search ties.
    const DEFAULT_SORT_COLUMN: &'static str;

    /// Whitelist of accepted `sort_by` keys → column names.
    fn sort_column(key: &str) -> Option<&'static str>;

    /// Values for [`SqliteEntity::INSERT_SQL`], in placeholder order.
    fn bind_params(&self) -> Vec<Value>;

    /// Builds a record from a row selected with [`SqliteEntity::SELECT_COLS`].
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error>;
}

fn opt_text(value: Option<&String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn opt_uuid(value: Option<Uuid>) -> Value {
    match value {
        Some(id) => Value::Text(id.to_string()),
        None => Value::Null,
    }
}

impl SqliteEntity for PersonRecord {
    const TABLE: &'static str = "persons";
    const SELECT_COLS: &'static str = "id, given_names, surname, sex, birth_date, death_date, \
                                       notes, parent_family_id, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO persons \
        (id, given_names, surname, sex, birth_date, death_date, notes, parent_family_id, version, updated_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
        ON CONFLICT(id) DO UPDATE SET \
        given_names = excluded.given_names, surname = excluded.surname, sex = excluded.sex, \
        birth_date = excluded.birth_date, death_date = excluded.death_date, notes = excluded.notes, \
        parent_family_id = excluded.parent_family_id, version = excluded.version, \
        updated_at = excluded.updated_at";
    const SEARCH_EXPR: &'static str = "given_names || ' ' || surname";
    const DEFAULT_SORT_COLUMN: &'static str = "surname";

    fn sort_column(key: &str) -> Option<&'static str> {
        match key {
            "surname" => Some("surname"),
            "given_names" => Some("given_names"),
            "birth_date" => Some("birth_date"),
            "updated_at" => Some("updated_at"),
            _ => None,
        }
    }

    fn bind_params(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.to_string()),
            Value::Text(self.given_names.clone()),
            Value::Text(self.surname.clone()),
            opt_text(self.sex.as_ref()),
            opt_text(self.birth_date.as_ref()),
            opt_text(self.death_date.as_ref()),
            opt_text(self.notes.as_ref()),
            opt_uuid(self.parent_family_id),
            Value::Integer(self.version),
            Value::Text(encode_dt(self.updated_at)),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(PersonRecord {
            id: decode_uuid(0, &row.get::<_, String>("id")?)?,
            given_names: row.get("given_names")?,
            surname: row.get("surname")?,
            sex: row.get("sex")?,
            birth_date: row.get("birth_date")?,
            death_date: row.get("death_date")?,
            notes: row.get("notes")?,
            parent_family_id: decode_opt_uuid(7, row.get("parent_family_id")?)?,
            version: row.get("version")?,
            updated_at: decode_dt(9, &row.get::<_, String>("updated_at")?)?,
        })
    }
}

impl SqliteEntity for FamilyRecord {
    const TABLE: &'static str = "families";
    const SELECT_COLS: &'static str =
        "id, husband_id, wife_id, marriage_date, children, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO families \
        (id, husband_id, wife_id, marriage_date, children, version, updated_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
        ON CONFLICT(id) DO UPDATE SET \
        husband_id = excluded.husband_id, wife_id = excluded.wife_id, \
        marriage_date = excluded.marriage_date, children = excluded.children, \
        version = excluded.version, updated_at = excluded.updated_at";
    const SEARCH_EXPR: &'static str = "COALESCE(marriage_date, '')";
    const DEFAULT_SORT_COLUMN: &'static str = "updated_at";

    fn sort_column(key: &str) -> Option<&'static str> {
        match key {
            "marriage_date" => Some("marriage_date"),
            "updated_at" => Some("updated_at"),
            _ => None,
        }
    }

    fn bind_params(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.to_string()),
            opt_uuid(self.husband_id),
            opt_uuid(self.wife_id),
            opt_text(self.marriage_date.as_ref()),
            Value::Text(encode_uuid_list(&self.children)),
            Value::Integer(self.version),
            Value::Text(encode_dt(self.updated_at)),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(FamilyRecord {
            id: decode_uuid(0, &row.get::<_, String>("id")?)?,
            husband_id: decode_opt_uuid(1, row.get("husband_id")?)?,
            wife_id: decode_opt_uuid(2, row.get("wife_id")?)?,
            marriage_date: row.get("marriage_date")?,
            children: decode_uuid_list(4, &row.get::<_, String>("children")?)?,
            version: row.get("version")?,
            updated_at: decode_dt(6, &row.get::<_, String>("updated_at")?)?,
        })
    }
}

impl SqliteEntity for SourceRecord {
    const TABLE: &'static str = "sources";
    const SELECT_COLS: &'static str =
        "id, title, author, publication, citation_count, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO sources \
        (id, title, author, publication, citation_count, version, updated_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
        ON CONFLICT(id) DO UPDATE SET \
        title = excluded.title, author = excluded.author, publication = excluded.publication, \
        citation_count = excluded.citation_count, version = excluded.version, \
        updated_at = excluded.updated_at";
    const SEARCH_EXPR: &'static str = "title || ' ' || COALESCE(author, '')";
    const DEFAULT_SORT_COLUMN: &'static str = "title";

    fn sort_column(key: &str) -> Option<&'static str> {
        match key {
            "title" => Some("title"),
            "author" => Some("author"),
            "citation_count" => Some("citation_count"),
            "updated_at" => Some("updated_at"),
            _ => None,
        }
    }

    fn bind_params(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.to_string()),
            Value::Text(self.title.clone()),
            opt_text(self.author.as_ref()),
            opt_text(self.publication.as_ref()),
            Value::Integer(self.citation_count),
            Value::Integer(self.version),
            Value::Text(encode_dt(self.updated_at)),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(SourceRecord {
            id: decode_uuid(0, &row.get::<_, String>("id")?)?,
            title: row.get("title")?,
            author: row.get("author")?,
            publication: row.get("publication")?,
            citation_count: row.get("citation_count")?,
            version: row.get("version")?,
            updated_at: decode_dt(6, &row.get::<_, String>("updated_at")?)?,
        })
    }
}

impl SqliteEntity for CitationRecord {
    const TABLE: &'static str = "citations";
    const SELECT_COLS: &'static str =
        "id, source_id, source_title, page, quality, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO citations \
        (id, source_id, source_title, page, quality, version, updated_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
        ON CONFLICT(id) DO UPDATE SET \
        source_id = excluded.source_id, source_title = excluded.source_title, \
        page = excluded.page, quality = excluded.quality, version = excluded.version, \
        updated_at = excluded.updated_at";
    const SEARCH_EXPR: &'static str = "source_title || ' ' || COALESCE(page, '')";
    const DEFAULT_SORT_COLUMN: &'static str = "source_title";

    fn sort_column(key: &str) -> Option<&'static str> {
        match key {
            "source_title" => Some("source_title"),
            "page" => Some("page"),
            "updated_at" => Some("updated_at"),
            _ => None,
        }
    }

    fn bind_params(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.to_string()),
            Value::Text(self.source_id.to_string()),
            Value::Text(self.source_title.clone()),
            opt_text(self.page.as_ref()),
            match self.quality {
                Some(q) => Value::Integer(i64::from(q)),
                None => Value::Null,
            },
            Value::Integer(self.version),
            Value::Text(encode_dt(self.updated_at)),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(CitationRecord {
            id: decode_uuid(0, &row.get::<_, String>("id")?)?,
            source_id: decode_uuid(1, &row.get::<_, String>("source_id")?)?,
            source_title: row.get("source_title")?,
            page: row.get("page")?,
            quality: row.get("quality")?,
            version: row.get("version")?,
            updated_at: decode_dt(6, &row.get::<_, String>("updated_at")?)?,
        })
    }
}

impl SqliteEntity for MediaRecord {
    const TABLE: &'static str = "media";
    const SELECT_COLS: &'static str = "id, title, file_name, mime_type, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO media \
        (id, title, file_name, mime_type, version, updated_at) \
        VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
        ON CONFLICT(id) DO UPDATE SET \
        title = excluded.title, file_name = excluded.file_name, \
        mime_type = excluded.mime_type, version = excluded.version, \
        updated_at = excluded.updated_at";
    const SEARCH_EXPR: &'static str = "title || ' ' || file_name";
    const DEFAULT_SORT_COLUMN: &'static str = "title";

    fn sort_column(key: &str) -> Option<&'static str> {
        match key {
            "title" => Some("title"),
            "file_name" => Some("file_name"),
            "updated_at" => Some("updated_at"),
            _ => None,
        }
    }

    fn bind_params(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.to_string()),
            Value::Text(self.title.clone()),
            Value::Text(self.file_name.clone()),
            opt_text(self.mime_type.as_ref()),
            Value::Integer(self.version),
            Value::Text(encode_dt(self.updated_at)),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(MediaRecord {
            id: decode_uuid(0, &row.get::<_, String>("id")?)?,
            title: row.get("title")?,
            file_name: row.get("file_name")?,
            mime_type: row.get("mime_type")?,
            version: row.get("version")?,
            updated_at: decode_dt(5, &row.get::<_, String>("updated_at")?)?,
        })
    }
}

// ── In-transaction helpers shared with the projection executor ───────────

pub(crate) fn get_in_tx<R: SqliteEntity>(
    conn: &rusqlite::Connection,
    id: Uuid,
) -> Result<Option<R>, rusqlite::Error> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", R::SELECT_COLS, R::TABLE);
    conn.query_row(&sql, params![id.to_string()], |row| R::from_row(row))
        .optional()
}

pub(crate) fn save_in_tx<R: SqliteEntity>(
    conn: &rusqlite::Connection,
    record: &R,
) -> Result<(), rusqlite::Error> {
    conn.execute(R::INSERT_SQL, params_from_iter(record.bind_params()))?;
    Ok(())
}

pub(crate) fn delete_in_tx<R: SqliteEntity>(
    conn: &rusqlite::Connection,
    id: Uuid,
) -> Result<(), rusqlite::Error> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", R::TABLE);
    conn.execute(&sql, params![id.to_string()])?;
    Ok(())
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    }
}

#[async_trait]
impl<R: SqliteEntity> EntityStore<R> for SqliteStore {
    async fn get(&self, id: Uuid) -> Result<R, StoreError> {
        let found = self
            .conn
            .call(move |conn| Ok(get_in_tx::<R>(conn, id)?))
            .await
            .map_err(call_err)?;
        found.ok_or(StoreError::NotFound {
            entity: R::STREAM.as_str(),
            id,
        })
    }

    async fn list(&self, options: &ListOptions) -> Result<Listed<R>, StoreError> {
        let column = options
            .sort_by
            .as_deref()
            .and_then(R::sort_column)
            .unwrap_or(R::DEFAULT_SORT_COLUMN);
        let sql = format!(
            "SELECT {}, COUNT(*) OVER () AS total FROM {} \
             ORDER BY {column} {}, id ASC LIMIT ?1 OFFSET ?2",
            R::SELECT_COLS,
            R::TABLE,
            direction(options.order),
        );
        let count_sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        let limit = options.limit.max(0);
        let offset = options.offset.max(0);

        let (rows, total) = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit, offset], |row| {
                        Ok((R::from_row(row)?, row.get::<_, i64>("total")?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                // An out-of-range page carries no window row with the count.
                let total = match rows.first() {
                    Some((_, total)) => *total,
                    None => conn.query_row(&count_sql, [], |row| row.get(0))?,
                };
                Ok((rows, total))
            })
            .await
            .map_err(call_err)?;

        Ok(Listed {
            records: rows.into_iter().map(|(record, _)| record).collect(),
            total,
        })
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<R>, StoreError> {
        let escaped = escape_like(query);
        let contains = format!("%{escaped}%");
        let prefix = format!("{escaped}%");
        let sql = format!(
            "SELECT {} FROM {} WHERE LOWER({expr}) LIKE ?1 ESCAPE '\\' \
             ORDER BY (CASE WHEN LOWER({expr}) LIKE ?2 ESCAPE '\\' THEN 0 ELSE 1 END), \
             {} ASC LIMIT ?3",
            R::SELECT_COLS,
            R::TABLE,
            R::DEFAULT_SORT_COLUMN,
            expr = R::SEARCH_EXPR,
        );
        let limit = limit.max(0);

        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map(params![contains, prefix, limit], |row| R::from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(call_err)?;
        Ok(records)
    }

    async fn save(&self, record: &R) -> Result<(), StoreError> {
        let record = record.clone();
        self.conn
            .call(move |conn| Ok(save_in_tx(conn, &record)?))
            .await
            .map_err(call_err)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| Ok(delete_in_tx::<R>(conn, id)?))
            .await
            .map_err(call_err)
    }
}
