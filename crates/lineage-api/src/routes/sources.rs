//! Source command and query routes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::event::{
    ChangeSet, DomainEvent, EntityDeleted, FieldsUpdated, SourceCreated, StreamType,
};
use lineage_core::read_model::SourceRecord;

use crate::error::ApiError;
use crate::routes::{self, VersionQuery, actor, diff_field};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateSource {
    title: String,
    author: Option<String>,
    publication: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateSource {
    expected_version: i64,
    title: Option<String>,
    author: Option<String>,
    publication: Option<String>,
}

/// POST /
async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSource>,
) -> Result<(StatusCode, Json<SourceRecord>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(StoreError::Validation("a source needs a title".into()).into());
    }

    let id = Uuid::new_v4();
    let event = DomainEvent::SourceCreated(SourceCreated {
        source_id: id,
        title: body.title,
        author: body.author,
        publication: body.publication,
    });
    state
        .events
        .append(id, StreamType::Source, 0, &[event], actor(&headers))
        .await?;

    let record = routes::get_record(&state, id).await?;
    Ok((StatusCode::CREATED, record))
}

/// GET /{id}
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SourceRecord>, ApiError> {
    routes::get_record(&state, id).await
}

/// PUT /{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdateSource>,
) -> Result<Json<SourceRecord>, ApiError> {
    let Json(current): Json<SourceRecord> = routes::get_record(&state, id).await?;

    let mut changes = ChangeSet::new();
    diff_field(&mut changes, "title", &current.title, body.title);
    diff_field(&mut changes, "author", &current.author, body.author.map(Some));
    diff_field(
        &mut changes,
        "publication",
        &current.publication,
        body.publication.map(Some),
    );

    if changes.is_empty() {
        return Ok(Json(current));
    }

    let event = DomainEvent::SourceUpdated(FieldsUpdated { id, changes });
    state
        .events
        .append(
            id,
            StreamType::Source,
            body.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;

    routes::get_record(&state, id).await
}

/// DELETE /{id}
///
/// Refused while citations still reference the source; callers delete the
/// citations first.
async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let Json(current): Json<SourceRecord> = routes::get_record(&state, id).await?;
    if current.citation_count > 0 {
        return Err(StoreError::Validation(format!(
            "source is referenced by {} citation(s)",
            current.citation_count
        ))
        .into());
    }

    let event = DomainEvent::SourceDeleted(EntityDeleted { id });
    state
        .events
        .append(
            id,
            StreamType::Source,
            query.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for source routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list_records::<SourceRecord>).post(create))
        .route("/search", get(routes::search_records::<SourceRecord>))
        .route("/{id}", get(get_one).put(update).delete(delete))
}
