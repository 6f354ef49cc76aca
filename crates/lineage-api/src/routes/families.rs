//! Family command and query routes, including child link management.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete as delete_route, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use lineage_core::event::{
    ChangeSet, ChildLink, DomainEvent, EntityDeleted, FamilyCreated, FieldsUpdated, StreamType,
};
use lineage_core::read_model::FamilyRecord;

use crate::error::ApiError;
use crate::routes::{self, VersionQuery, actor, diff_field};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateFamily {
    husband_id: Option<Uuid>,
    wife_id: Option<Uuid>,
    marriage_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateFamily {
    expected_version: i64,
    husband_id: Option<Uuid>,
    wife_id: Option<Uuid>,
    marriage_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkChild {
    person_id: Uuid,
    expected_version: i64,
}

/// POST /
async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateFamily>,
) -> Result<(StatusCode, Json<FamilyRecord>), ApiError> {
    let id = Uuid::new_v4();
    let event = DomainEvent::FamilyCreated(FamilyCreated {
        family_id: id,
        husband_id: body.husband_id,
        wife_id: body.wife_id,
        marriage_date: body.marriage_date,
    });
    state
        .events
        .append(id, StreamType::Family, 0, &[event], actor(&headers))
        .await?;

    let record = routes::get_record(&state, id).await?;
    Ok((StatusCode::CREATED, record))
}

/// GET /{id}
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FamilyRecord>, ApiError> {
    routes::get_record(&state, id).await
}

/// PUT /{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdateFamily>,
) -> Result<Json<FamilyRecord>, ApiError> {
    let Json(current): Json<FamilyRecord> = routes::get_record(&state, id).await?;

    let mut changes = ChangeSet::new();
    diff_field(&mut changes, "husband_id", &current.husband_id, body.husband_id.map(Some));
    diff_field(&mut changes, "wife_id", &current.wife_id, body.wife_id.map(Some));
    diff_field(
        &mut changes,
        "marriage_date",
        &current.marriage_date,
        body.marriage_date.map(Some),
    );

    if changes.is_empty() {
        return Ok(Json(current));
    }

    let event = DomainEvent::FamilyUpdated(FieldsUpdated { id, changes });
    state
        .events
        .append(
            id,
            StreamType::Family,
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
    let event = DomainEvent::FamilyDeleted(EntityDeleted { id });
    state
        .events
        .append(
            id,
            StreamType::Family,
            query.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /{id}/children
async fn link_child(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<LinkChild>,
) -> Result<Json<FamilyRecord>, ApiError> {
    let event = DomainEvent::ChildLinkedToFamily(ChildLink {
        family_id: id,
        person_id: body.person_id,
    });
    state
        .events
        .append(
            id,
            StreamType::Family,
            body.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;

    routes::get_record(&state, id).await
}

/// DELETE /{id}/children/{person_id}
async fn unlink_child(
    State(state): State<AppState>,
    Path((id, person_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<VersionQuery>,
    headers: HeaderMap,
) -> Result<Json<FamilyRecord>, ApiError> {
    let event = DomainEvent::ChildUnlinkedFromFamily(ChildLink {
        family_id: id,
        person_id,
    });
    state
        .events
        .append(
            id,
            StreamType::Family,
            query.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;

    routes::get_record(&state, id).await
}

/// Returns the router for family routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list_records::<FamilyRecord>).post(create))
        .route("/search", get(routes::search_records::<FamilyRecord>))
        .route("/{id}", get(get_one).put(update).delete(delete))
        .route("/{id}/children", post(link_child))
        .route("/{id}/children/{person_id}", delete_route(unlink_child))
}
