//! Citation command and query routes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::event::{
    ChangeSet, CitationCreated, DomainEvent, EntityDeleted, FieldsUpdated, StreamType,
};
use lineage_core::read_model::{CitationRecord, SourceRecord};

use crate::error::ApiError;
use crate::routes::{self, VersionQuery, actor, diff_field};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateCitation {
    source_id: Uuid,
    page: Option<String>,
    quality: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct UpdateCitation {
    expected_version: i64,
    page: Option<String>,
    quality: Option<i32>,
}

fn validate_quality(quality: Option<i32>) -> Result<(), ApiError> {
    if let Some(quality) = quality
        && !(0..=3).contains(&quality)
    {
        return Err(StoreError::Validation(format!(
            "quality must be between 0 and 3, got {quality}"
        ))
        .into());
    }
    Ok(())
}

/// POST /
///
/// The cited source must exist; the projector snapshots its title onto
/// the citation record.
async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateCitation>,
) -> Result<(StatusCode, Json<CitationRecord>), ApiError> {
    validate_quality(body.quality)?;
    let Json(_source): Json<SourceRecord> = routes::get_record(&state, body.source_id).await?;

    let id = Uuid::new_v4();
    let event = DomainEvent::CitationCreated(CitationCreated {
        citation_id: id,
        source_id: body.source_id,
        page: body.page,
        quality: body.quality,
    });
    state
        .events
        .append(id, StreamType::Citation, 0, &[event], actor(&headers))
        .await?;

    let record = routes::get_record(&state, id).await?;
    Ok((StatusCode::CREATED, record))
}

/// GET /{id}
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CitationRecord>, ApiError> {
    routes::get_record(&state, id).await
}

/// PUT /{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdateCitation>,
) -> Result<Json<CitationRecord>, ApiError> {
    validate_quality(body.quality)?;
    let Json(current): Json<CitationRecord> = routes::get_record(&state, id).await?;

    let mut changes = ChangeSet::new();
    diff_field(&mut changes, "page", &current.page, body.page.map(Some));
    diff_field(&mut changes, "quality", &current.quality, body.quality.map(Some));

    if changes.is_empty() {
        return Ok(Json(current));
    }

    let event = DomainEvent::CitationUpdated(FieldsUpdated { id, changes });
    state
        .events
        .append(
            id,
            StreamType::Citation,
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
    let event = DomainEvent::CitationDeleted(EntityDeleted { id });
    state
        .events
        .append(
            id,
            StreamType::Citation,
            query.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for citation routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list_records::<CitationRecord>).post(create))
        .route("/search", get(routes::search_records::<CitationRecord>))
        .route("/{id}", get(get_one).put(update).delete(delete))
}
