//! History/audit query routes.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use lineage_core::error::StoreError;
use lineage_core::event::StreamType;
use lineage_history::{ChangeHistory, HistoryFilter};

use crate::error::ApiError;
use crate::state::AppState;

/// Parses an entity-type path/query value; an unknown name is a caller
/// mistake, not a decode failure.
fn parse_entity_type(value: &str) -> Result<StreamType, ApiError> {
    StreamType::parse(value)
        .map_err(|_| StoreError::Validation(format!("unknown entity type: {value}")).into())
}

#[derive(Debug, Deserialize)]
struct GlobalHistoryQuery {
    entity_type: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EntityHistoryQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (limit.unwrap_or(50).clamp(1, 500), offset.unwrap_or(0).max(0))
}

/// GET /
async fn global(
    State(state): State<AppState>,
    Query(query): Query<GlobalHistoryQuery>,
) -> Result<Json<ChangeHistory>, ApiError> {
    let entity_type = query
        .entity_type
        .as_deref()
        .map(parse_entity_type)
        .transpose()?;
    let (limit, offset) = page(query.limit, query.offset);

    let history = state
        .history
        .global_history(&HistoryFilter {
            entity_type,
            from: query.from,
            to: query.to,
            limit,
            offset,
        })
        .await?;
    Ok(Json(history))
}

/// GET /{entity_type}/{id}
async fn entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, Uuid)>,
    Query(query): Query<EntityHistoryQuery>,
) -> Result<Json<ChangeHistory>, ApiError> {
    let entity_type = parse_entity_type(&entity_type)?;
    let (limit, offset) = page(query.limit, query.offset);

    let history = state
        .history
        .entity_history(entity_type, id, limit, offset)
        .await?;
    Ok(Json(history))
}

/// Returns the router for history routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(global))
        .route("/{entity_type}/{id}", get(entity))
}
