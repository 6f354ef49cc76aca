//! Person command and query routes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::event::{
    ChangeSet, DomainEvent, EntityDeleted, FieldsUpdated, PersonCreated, StreamType,
};
use lineage_core::read_model::PersonRecord;

use crate::error::ApiError;
use crate::routes::{self, VersionQuery, actor, diff_field};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreatePerson {
    given_names: String,
    surname: String,
    sex: Option<String>,
    birth_date: Option<String>,
    death_date: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatePerson {
    expected_version: i64,
    given_names: Option<String>,
    surname: Option<String>,
    sex: Option<String>,
    birth_date: Option<String>,
    death_date: Option<String>,
    notes: Option<String>,
}

/// POST /
async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePerson>,
) -> Result<(StatusCode, Json<PersonRecord>), ApiError> {
    if body.given_names.trim().is_empty() && body.surname.trim().is_empty() {
        return Err(StoreError::Validation("a person needs at least one name".into()).into());
    }

    let id = Uuid::new_v4();
    let event = DomainEvent::PersonCreated(PersonCreated {
        person_id: id,
        given_names: body.given_names,
        surname: body.surname,
        sex: body.sex,
        birth_date: body.birth_date,
        death_date: body.death_date,
        notes: body.notes,
    });
    state
        .events
        .append(id, StreamType::Person, 0, &[event], actor(&headers))
        .await?;

    let record = routes::get_record(&state, id).await?;
    Ok((StatusCode::CREATED, record))
}

/// GET /{id}
async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PersonRecord>, ApiError> {
    routes::get_record(&state, id).await
}

/// PUT /{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<UpdatePerson>,
) -> Result<Json<PersonRecord>, ApiError> {
    let Json(current): Json<PersonRecord> = routes::get_record(&state, id).await?;

    let mut changes = ChangeSet::new();
    diff_field(&mut changes, "given_names", &current.given_names, body.given_names);
    diff_field(&mut changes, "surname", &current.surname, body.surname);
    diff_field(&mut changes, "sex", &current.sex, body.sex.map(Some));
    diff_field(&mut changes, "birth_date", &current.birth_date, body.birth_date.map(Some));
    diff_field(&mut changes, "death_date", &current.death_date, body.death_date.map(Some));
    diff_field(&mut changes, "notes", &current.notes, body.notes.map(Some));

    // A no-op update appends nothing.
    if changes.is_empty() {
        return Ok(Json(current));
    }

    let event = DomainEvent::PersonUpdated(FieldsUpdated { id, changes });
    state
        .events
        .append(
            id,
            StreamType::Person,
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
    let event = DomainEvent::PersonDeleted(EntityDeleted { id });
    state
        .events
        .append(
            id,
            StreamType::Person,
            query.expected_version,
            &[event],
            actor(&headers),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for person routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list_records::<PersonRecord>).post(create))
        .route("/search", get(routes::search_records::<PersonRecord>))
        .route("/{id}", get(get_one).put(update).delete(delete))
}
