//! Route modules and the request/response plumbing they share.

pub mod citations;
pub mod families;
pub mod health;
pub mod history;
pub mod media;
pub mod persons;
pub mod sources;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use lineage_core::event::{ChangeSet, FieldChange};
use lineage_core::read_model::{EntityStore, ListOptions, ReadModel, ReadModelStore, SortOrder};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the optional actor identity recorded on appended
/// events.
pub const ACTOR_HEADER: &str = "x-lineage-actor";

pub(crate) fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Query parameters accepted by every list endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    sort_by: Option<String>,
    order: Option<String>,
}

impl ListQuery {
    fn options(&self) -> ListOptions {
        let defaults = ListOptions::default();
        ListOptions {
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, 500),
            offset: self.offset.unwrap_or(0).max(0),
            sort_by: self.sort_by.clone(),
            order: match self.order.as_deref() {
                Some("desc") => SortOrder::Descending,
                _ => SortOrder::Ascending,
            },
        }
    }
}

/// Query parameters accepted by every search endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    q: String,
    limit: Option<i64>,
}

/// Query parameter carrying the optimistic-concurrency guard on delete
/// endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionQuery {
    pub expected_version: i64,
}

/// One page of records plus the total match count.
#[derive(Debug, Serialize)]
pub(crate) struct Page<R> {
    records: Vec<R>,
    total: i64,
}

/// Shared GET /{id} handler body.
pub(crate) async fn get_record<R: ReadModel>(
    state: &AppState,
    id: uuid::Uuid,
) -> Result<Json<R>, ApiError>
where
    dyn ReadModelStore: EntityStore<R>,
{
    let record = EntityStore::<R>::get(state.read_models.as_ref(), id).await?;
    Ok(Json(record))
}

/// Shared GET / handler body.
pub(crate) async fn list_records<R: ReadModel>(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<R>>, ApiError>
where
    dyn ReadModelStore: EntityStore<R>,
{
    let listed =
        EntityStore::<R>::list(state.read_models.as_ref(), &query.options()).await?;
    Ok(Json(Page {
        records: listed.records,
        total: listed.total,
    }))
}

/// Shared GET /search handler body.
pub(crate) async fn search_records<R: ReadModel>(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<R>>, ApiError>
where
    dyn ReadModelStore: EntityStore<R>,
{
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let hits = EntityStore::<R>::search(state.read_models.as_ref(), &query.q, limit).await?;
    Ok(Json(hits))
}

/// Records a field change when the requested value differs from the
/// current one. `None` requests leave the field untouched.
pub(crate) fn diff_field<T: Serialize + PartialEq>(
    changes: &mut ChangeSet,
    field: &str,
    current: &T,
    requested: Option<T>,
) {
    let Some(requested) = requested else {
        return;
    };
    if requested == *current {
        return;
    }
    changes.insert(
        field.to_owned(),
        FieldChange {
            old: serde_json::to_value(current).unwrap_or(serde_json::Value::Null),
            new: serde_json::to_value(&requested).unwrap_or(serde_json::Value::Null),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_field_skips_absent_and_unchanged_values() {
        let mut changes = ChangeSet::new();
        diff_field(&mut changes, "surname", &"Smith".to_owned(), None);
        diff_field(
            &mut changes,
            "surname",
            &"Smith".to_owned(),
            Some("Smith".to_owned()),
        );
        assert!(changes.is_empty());

        diff_field(
            &mut changes,
            "surname",
            &"Smith".to_owned(),
            Some("Jones".to_owned()),
        );
        assert_eq!(changes["surname"].old, serde_json::json!("Smith"));
        assert_eq!(changes["surname"].new, serde_json::json!("Jones"));
    }

    #[test]
    fn list_query_clamps_and_defaults() {
        let query = ListQuery {
            limit: Some(10_000),
            offset: Some(-5),
            sort_by: None,
            order: Some("desc".into()),
        };
        let options = query.options();
        assert_eq!(options.limit, 500);
        assert_eq!(options.offset, 0);
        assert_eq!(options.order, SortOrder::Descending);
    }
}
