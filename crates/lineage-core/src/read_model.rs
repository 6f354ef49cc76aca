//! Read-model record types and the queryable store contract.
//!
//! Read models are the denormalized, mutable-in-place mirror of current
//! state. Every mutation happens through the projector in response to an
//! event; nothing else writes here, so the tables are rebuildable by
//! replaying the log from position 0.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::error::StoreError;
use crate::event::StreamType;

/// Behavior common to every read-model record.
pub trait ReadModel: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The aggregate kind this record mirrors.
    const STREAM: StreamType;

    /// The record id; always equals the event-store stream id.
    fn id(&self) -> Uuid;

    /// Version of the last event from the record's own stream applied to
    /// it. Denormalization side effects from other streams do not bump it.
    fn version(&self) -> i64;

    /// Human-facing label used by history entries and search results.
    fn display_label(&self) -> String;
}

/// Current state of one person.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct PersonRecord {
    /// Stream id.
    pub id: Uuid,
    /// Given names, space-separated.
    pub given_names: String,
    /// Surname.
    pub surname: String,
    /// Sex, if recorded.
    pub sex: Option<String>,
    /// Birth date as entered.
    pub birth_date: Option<String>,
    /// Death date as entered.
    pub death_date: Option<String>,
    /// Research notes.
    pub notes: Option<String>,
    /// The family this person is a child of, maintained by child
    /// link/unlink events on the family stream.
    pub parent_family_id: Option<Uuid>,
    /// Own-stream version.
    pub version: i64,
    /// Timestamp of the last event applied.
    pub updated_at: DateTime<Utc>,
}

impl ReadModel for PersonRecord {
    const STREAM: StreamType = StreamType::Person;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn display_label(&self) -> String {
        format!("{} {}", self.given_names, self.surname)
            .trim()
            .to_owned()
    }
}

/// Current state of one family unit.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct FamilyRecord {
    /// Stream id.
    pub id: Uuid,
    /// Husband/first partner.
    pub husband_id: Option<Uuid>,
    /// Wife/second partner.
    pub wife_id: Option<Uuid>,
    /// Marriage date as entered.
    pub marriage_date: Option<String>,
    /// Linked children, in link order.
    pub children: Vec<Uuid>,
    /// Own-stream version.
    pub version: i64,
    /// Timestamp of the last event applied.
    pub updated_at: DateTime<Utc>,
}

impl ReadModel for FamilyRecord {
    const STREAM: StreamType = StreamType::Family;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn display_label(&self) -> String {
        // Spouse names live on person records; the history service joins
        // them on read. The record itself only has a generic label.
        match &self.marriage_date {
            Some(date) => format!("Family (m. {date})"),
            None => "Family".to_owned(),
        }
    }
}

/// Current state of one documentary source.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct SourceRecord {
    /// Stream id.
    pub id: Uuid,
    /// Source title.
    pub title: String,
    /// Author, if known.
    pub author: Option<String>,
    /// Publication details.
    pub publication: Option<String>,
    /// Number of live citations referencing this source. Maintained by
    /// citation events; not part of this record's own stream.
    pub citation_count: i64,
    /// Own-stream version.
    pub version: i64,
    /// Timestamp of the last event applied.
    pub updated_at: DateTime<Utc>,
}

impl ReadModel for SourceRecord {
    const STREAM: StreamType = StreamType::Source;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn display_label(&self) -> String {
        self.title.clone()
    }
}

/// Current state of one citation.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct CitationRecord {
    /// Stream id.
    pub id: Uuid,
    /// The cited source (non-owning; the source may be deleted later).
    pub source_id: Uuid,
    /// The source's title as it was when the citation was created. A
    /// snapshot: a later source rename does not update it.
    pub source_title: String,
    /// Page or locator within the source.
    pub page: Option<String>,
    /// Data quality assessment (0–3).
    pub quality: Option<i32>,
    /// Own-stream version.
    pub version: i64,
    /// Timestamp of the last event applied.
    pub updated_at: DateTime<Utc>,
}

impl ReadModel for CitationRecord {
    const STREAM: StreamType = StreamType::Citation;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn display_label(&self) -> String {
        match &self.page {
            Some(page) => format!("{}, {page}", self.source_title),
            None => self.source_title.clone(),
        }
    }
}

/// Current state of one media object.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct MediaRecord {
    /// Stream id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Stored file name.
    pub file_name: String,
    /// MIME type, if detected.
    pub mime_type: Option<String>,
    /// Own-stream version.
    pub version: i64,
    /// Timestamp of the last event applied.
    pub updated_at: DateTime<Utc>,
}

impl ReadModel for MediaRecord {
    const STREAM: StreamType = StreamType::Media;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn display_label(&self) -> String {
        self.title.clone()
    }
}

/// Sort direction for [`ListOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Pagination and ordering for list queries.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Maximum records to return.
    pub limit: i64,
    /// Records to skip.
    pub offset: i64,
    /// Field to sort by; backends whitelist the accepted names per entity
    /// and fall back to the entity's default ordering for anything else.
    pub sort_by: Option<String>,
    /// Sort direction.
    pub order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            sort_by: None,
            order: SortOrder::Ascending,
        }
    }
}

/// One page of a list query.
#[derive(Debug, Clone)]
pub struct Listed<R> {
    /// The page of records.
    pub records: Vec<R>,
    /// Total matching records, independent of the page bounds.
    pub total: i64,
}

/// Per-entity queryable store, implemented once per record type by each
/// backend.
///
/// `save` and `delete` exist for the projector and the rebuild path; no
/// other code writes through them.
#[async_trait::async_trait]
pub trait EntityStore<R: ReadModel>: Send + Sync {
    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent; [`StoreError::Storage`] on
    /// backend failure.
    async fn get(&self, id: Uuid) -> Result<R, StoreError>;

    /// List records with pagination and ordering. Empty result is not an
    /// error.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] on backend failure.
    async fn list(&self, options: &ListOptions) -> Result<Listed<R>, StoreError>;

    /// Case-insensitive substring search over the entity's display fields,
    /// most relevant (prefix matches) first. Empty result is not an error.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] on backend failure.
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<R>, StoreError>;

    /// Upsert by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] on backend failure.
    async fn save(&self, record: &R) -> Result<(), StoreError>;

    /// Delete by id. Idempotent; deleting a nonexistent id is not an error.
    ///
    /// # Errors
    ///
    /// [`StoreError::Storage`] on backend failure.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// The full read-model store: one [`EntityStore`] per entity type. Both
/// storage backends implement every piece, so this is what gets injected as
/// a trait object.
pub trait ReadModelStore:
    EntityStore<PersonRecord>
    + EntityStore<FamilyRecord>
    + EntityStore<SourceRecord>
    + EntityStore<CitationRecord>
    + EntityStore<MediaRecord>
{
}

impl<T> ReadModelStore for T where
    T: EntityStore<PersonRecord>
        + EntityStore<FamilyRecord>
        + EntityStore<SourceRecord>
        + EntityStore<CitationRecord>
        + EntityStore<MediaRecord>
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_display_label_joins_names() {
        let person = PersonRecord {
            id: Uuid::new_v4(),
            given_names: "Ada".into(),
            surname: "Lovelace".into(),
            sex: None,
            birth_date: None,
            death_date: None,
            notes: None,
            parent_family_id: None,
            version: 1,
            updated_at: Utc::now(),
        };
        assert_eq!(person.display_label(), "Ada Lovelace");
    }

    #[test]
    fn citation_display_label_includes_page_when_present() {
        let mut citation = CitationRecord {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            source_title: "1850 Census".into(),
            page: Some("p. 12".into()),
            quality: None,
            version: 1,
            updated_at: Utc::now(),
        };
        assert_eq!(citation.display_label(), "1850 Census, p. 12");
        citation.page = None;
        assert_eq!(citation.display_label(), "1850 Census");
    }
}
