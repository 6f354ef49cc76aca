//! Read-model persistence: one [`PgEntity`] mapping per record type and a
//! single generic [`EntityStore`] implementation over them.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Row as _, query::Query};
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::read_model::{
    CitationRecord, EntityStore, FamilyRecord, ListOptions, Listed, MediaRecord, PersonRecord,
    ReadModel, SortOrder, SourceRecord,
};

use crate::store::PgStore;

/// Escapes `%`, `_`, and backslash for an ILIKE pattern.
pub(crate) fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Per-entity SQL mapping. The generic [`EntityStore`] impl and the
/// in-transaction projection helpers are written once against this.
pub(crate) trait PgEntity: ReadModel {
    /// Table name.
    const TABLE: &'static str;
    /// Column list matching [`PgEntity::from_row`].
    const SELECT_COLS: &'static str;
    /// Upsert statement matching [`PgEntity::bind_insert`].
    const INSERT_SQL: &'static str;
    /// SQL expression searched over by [`EntityStore::search`].
    const SEARCH_EXPR: &'static str;
    /// Default ordering column for lists and search ties.
    const DEFAULT_SORT_COLUMN: &'static str;

    /// Whitelist of accepted `sort_by` keys → column names.
    fn sort_column(key: &str) -> Option<&'static str>;

    /// Binds this record's values onto [`PgEntity::INSERT_SQL`], in
    /// placeholder order.
    fn bind_insert<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments>;

    /// Builds a record from a row selected with [`PgEntity::SELECT_COLS`].
    ///
    /// # Errors
    ///
    /// [`sqlx::Error`] on column type mismatch.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

impl PgEntity for PersonRecord {
    const TABLE: &'static str = "persons";
    const SELECT_COLS: &'static str = "id, given_names, surname, sex, birth_date, death_date, \
                                       notes, parent_family_id, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO persons \
        (id, given_names, surname, sex, birth_date, death_date, notes, parent_family_id, version, updated_at) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
        ON CONFLICT (id) DO UPDATE SET \
        given_names = EXCLUDED.given_names, surname = EXCLUDED.surname, sex = EXCLUDED.sex, \
        birth_date = EXCLUDED.birth_date, death_date = EXCLUDED.death_date, notes = EXCLUDED.notes, \
        parent_family_id = EXCLUDED.parent_family_id, version = EXCLUDED.version, \
        updated_at = EXCLUDED.updated_at";
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

    fn bind_insert<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.id)
            .bind(self.given_names.clone())
            .bind(self.surname.clone())
            .bind(self.sex.clone())
            .bind(self.birth_date.clone())
            .bind(self.death_date.clone())
            .bind(self.notes.clone())
            .bind(self.parent_family_id)
            .bind(self.version)
            .bind(self.updated_at)
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(PersonRecord {
            id: row.try_get("id")?,
            given_names: row.try_get("given_names")?,
            surname: row.try_get("surname")?,
            sex: row.try_get("sex")?,
            birth_date: row.try_get("birth_date")?,
            death_date: row.try_get("death_date")?,
            notes: row.try_get("notes")?,
            parent_family_id: row.try_get("parent_family_id")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgEntity for FamilyRecord {
    const TABLE: &'static str = "families";
    const SELECT_COLS: &'static str =
        "id, husband_id, wife_id, marriage_date, children, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO families \
        (id, husband_id, wife_id, marriage_date, children, version, updated_at) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT (id) DO UPDATE SET \
        husband_id = EXCLUDED.husband_id, wife_id = EXCLUDED.wife_id, \
        marriage_date = EXCLUDED.marriage_date, children = EXCLUDED.children, \
        version = EXCLUDED.version, updated_at = EXCLUDED.updated_at";
    const SEARCH_EXPR: &'static str = "COALESCE(marriage_date, '')";
    const DEFAULT_SORT_COLUMN: &'static str = "updated_at";

    fn sort_column(key: &str) -> Option<&'static str> {
        match key {
            "marriage_date" => Some("marriage_date"),
            "updated_at" => Some("updated_at"),
            _ => None,
        }
    }

    fn bind_insert<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.id)
            .bind(self.husband_id)
            .bind(self.wife_id)
            .bind(self.marriage_date.clone())
            .bind(serde_json::json!(self.children))
            .bind(self.version)
            .bind(self.updated_at)
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let children: serde_json::Value = row.try_get("children")?;
        let children: Vec<Uuid> = serde_json::from_value(children)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "children".into(),
                source: Box::new(e),
            })?;
        Ok(FamilyRecord {
            id: row.try_get("id")?,
            husband_id: row.try_get("husband_id")?,
            wife_id: row.try_get("wife_id")?,
            marriage_date: row.try_get("marriage_date")?,
            children,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgEntity for SourceRecord {
    const TABLE: &'static str = "sources";
    const SELECT_COLS: &'static str =
        "id, title, author, publication, citation_count, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO sources \
        (id, title, author, publication, citation_count, version, updated_at) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT (id) DO UPDATE SET \
        title = EXCLUDED.title, author = EXCLUDED.author, publication = EXCLUDED.publication, \
        citation_count = EXCLUDED.citation_count, version = EXCLUDED.version, \
        updated_at = EXCLUDED.updated_at";
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

    fn bind_insert<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.id)
            .bind(self.title.clone())
            .bind(self.author.clone())
            .bind(self.publication.clone())
            .bind(self.citation_count)
            .bind(self.version)
            .bind(self.updated_at)
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(SourceRecord {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            publication: row.try_get("publication")?,
            citation_count: row.try_get("citation_count")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgEntity for CitationRecord {
    const TABLE: &'static str = "citations";
    const SELECT_COLS: &'static str =
        "id, source_id, source_title, page, quality, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO citations \
        (id, source_id, source_title, page, quality, version, updated_at) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT (id) DO UPDATE SET \
        source_id = EXCLUDED.source_id, source_title = EXCLUDED.source_title, \
        page = EXCLUDED.page, quality = EXCLUDED.quality, version = EXCLUDED.version, \
        updated_at = EXCLUDED.updated_at";
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

    fn bind_insert<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.id)
            .bind(self.source_id)
            .bind(self.source_title.clone())
            .bind(self.page.clone())
            .bind(self.quality)
            .bind(self.version)
            .bind(self.updated_at)
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(CitationRecord {
            id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            source_title: row.try_get("source_title")?,
            page: row.try_get("page")?,
            quality: row.try_get("quality")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PgEntity for MediaRecord {
    const TABLE: &'static str = "media";
    const SELECT_COLS: &'static str = "id, title, file_name, mime_type, version, updated_at";
    const INSERT_SQL: &'static str = "INSERT INTO media \
        (id, title, file_name, mime_type, version, updated_at) \
        VALUES ($1, $2, $3, $4, $5, $6) \
        ON CONFLICT (id) DO UPDATE SET \
        title = EXCLUDED.title, file_name = EXCLUDED.file_name, \
        mime_type = EXCLUDED.mime_type, version = EXCLUDED.version, \
        updated_at = EXCLUDED.updated_at";
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

    fn bind_insert<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.id)
            .bind(self.title.clone())
            .bind(self.file_name.clone())
            .bind(self.mime_type.clone())
            .bind(self.version)
            .bind(self.updated_at)
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(MediaRecord {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            file_name: row.try_get("file_name")?,
            mime_type: row.try_get("mime_type")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ── Shared helpers (pool- and transaction-scope) ─────────────────────────

pub(crate) async fn get_by_id<'e, R, E>(executor: E, id: Uuid) -> Result<Option<R>, StoreError>
where
    R: PgEntity,
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {} FROM {} WHERE id = $1", R::SELECT_COLS, R::TABLE);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(StoreError::storage)?;
    row.map(|row| R::from_row(&row))
        .transpose()
        .map_err(StoreError::storage)
}

pub(crate) async fn upsert<'e, R, E>(executor: E, record: &R) -> Result<(), StoreError>
where
    R: PgEntity,
    E: sqlx::Executor<'e, Database = Postgres>,
{
    record
        .bind_insert(sqlx::query(R::INSERT_SQL))
        .execute(executor)
        .await
        .map_err(StoreError::storage)?;
    Ok(())
}

pub(crate) async fn delete_by_id<'e, R, E>(executor: E, id: Uuid) -> Result<(), StoreError>
where
    R: PgEntity,
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = format!("DELETE FROM {} WHERE id = $1", R::TABLE);
    sqlx::query(&sql)
        .bind(id)
        .execute(executor)
        .await
        .map_err(StoreError::storage)?;
    Ok(())
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    }
}

#[async_trait]
impl<R: PgEntity> EntityStore<R> for PgStore {
    async fn get(&self, id: Uuid) -> Result<R, StoreError> {
        get_by_id::<R, &PgPool>(self.pool(), id)
            .await?
            .ok_or(StoreError::NotFound {
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
             ORDER BY {column} {}, id ASC LIMIT $1 OFFSET $2",
            R::SELECT_COLS,
            R::TABLE,
            direction(options.order),
        );

        let rows = sqlx::query(&sql)
            .bind(options.limit.max(0))
            .bind(options.offset.max(0))
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::storage)?;

        // An out-of-range page carries no window row with the count.
        let total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("total").map_err(StoreError::storage)?,
            None => {
                let count_sql = format!("SELECT COUNT(*) AS total FROM {}", R::TABLE);
                sqlx::query(&count_sql)
                    .fetch_one(self.pool())
                    .await
                    .map_err(StoreError::storage)?
                    .try_get("total")
                    .map_err(StoreError::storage)?
            }
        };
        let records = rows
            .iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::storage)?;

        Ok(Listed { records, total })
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<R>, StoreError> {
        let escaped = escape_like(query);
        let sql = format!(
            "SELECT {} FROM {} WHERE {expr} ILIKE $1 \
             ORDER BY (CASE WHEN {expr} ILIKE $2 THEN 0 ELSE 1 END), {} ASC LIMIT $3",
            R::SELECT_COLS,
            R::TABLE,
            R::DEFAULT_SORT_COLUMN,
            expr = R::SEARCH_EXPR,
        );

        let rows = sqlx::query(&sql)
            .bind(format!("%{escaped}%"))
            .bind(format!("{escaped}%"))
            .bind(limit.max(0))
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::storage)?;

        rows.iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::storage)
    }

    async fn save(&self, record: &R) -> Result<(), StoreError> {
        upsert(self.pool(), record).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        delete_by_id::<R, &PgPool>(self.pool(), id).await
    }
}
