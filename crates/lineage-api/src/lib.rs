//! Lineage API — the HTTP surface over the persistence core.
//!
//! Handlers are the canonical command path: load the current read model,
//! compute the field-level diff, build events, and append them with the
//! caller's expected version. All writes flow through the event store;
//! nothing here touches the read models directly except to read.

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router over the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/persons", routes::persons::router())
        .nest("/api/v1/families", routes::families::router())
        .nest("/api/v1/sources", routes::sources::router())
        .nest("/api/v1/citations", routes::citations::router())
        .nest("/api/v1/media", routes::media::router())
        .nest("/api/v1/history", routes::history::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
