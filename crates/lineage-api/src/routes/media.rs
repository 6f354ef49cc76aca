//! Media command and query routes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::event::{
    ChangeSet, DomainEvent, EntityDeleted, FieldsUpdated, MediaCreated, StreamType,
};
use lineage_core::read_model::MediaRecord;

use crate::error::ApiError;
use crate::routes::{self, VersionQuery, actor, diff_field};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateMedia {
    title: String,
    file_name: String,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateMedia {
    expected_version: i64,
    title: Option<String>,
    file_name: Option<String>,
    mime_type: Option<String>,
}

/// POST /
async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateMedia>,
) -> Result<(StatusCode, Json<MediaRecord>), ApiError> {
    if body.file_name.trim().is_empty() {
        return Err(StoreError::Validation("a media object needs a file name".into()).into());
    }

    let id = Uuid::new_v4();
    let event = DomainEvent::MediaCreated(MediaCreated {
        media_id: id,
        title: body.title,
        file_name: body.file_name,
        mime_type: body.mime_type,
    });
    state
        .events
        .append(id, StreamType::Media, 0, &[event], actor(&headers))
        .await?;

    let record = routes::get_record(&state, id).await?;
    Ok((StatusCode::CREATED, record))
}

/// GET /{id}
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MediaRecord>, ApiError> {
    routes::get_record(&state, id).await
}

/// PUT /{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdateMedia>,
) -> Result<Json<MediaRecord>, ApiError> {
    let Json(current): Json<MediaRecord> = routes::get_record(&state, id).await?;

    let mut changes = ChangeSet::new();
    diff_field(&mut changes, "title", &current.title, body.title);
    diff_field(&mut changes, "file_name", &current.file_name, body.file_name);
    diff_field(&mut changes, "mime_type", &current.mime_type, body.mime_type.map(Some));

    if changes.is_empty() {
        return Ok(Json(current));
    }

    let event = DomainEvent::MediaUpdated(FieldsUpdated { id, changes });
    state
        .events
        .append(
            id,
            StreamType::Media,
            body.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;

    routes::get_record(&state, id).await
}

/// DELETE /{id}
async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let event = DomainEvent::MediaDeleted(EntityDeleted { id });
    state
        .events
        .append(
            id,
            StreamType::Media,
            query.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for media routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list_records::<MediaRecord>).post(create))
        .route("/search", get(routes::search_records::<MediaRecord>))
        .route("/{id}", get(get_one).put(update).delete(delete))
}
