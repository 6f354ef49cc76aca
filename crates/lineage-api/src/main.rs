//! Lineage API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use lineage_api::error::AppError;
use lineage_api::state::AppState;
use lineage_store_postgres::PgStore;
use lineage_store_sqlite::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Lineage API server");

    // PostgreSQL when DATABASE_URL is set, otherwise the embedded
    // single-file store.
    let state = if let Ok(database_url) = std::env::var("DATABASE_URL") {
        tracing::info!("using the PostgreSQL backend");
        let store = Arc::new(PgStore::connect(&database_url).await?);
        AppState::new(store.clone(), store)
    } else {
        let path =
            std::env::var("LINEAGE_DB_PATH").unwrap_or_else(|_| "lineage.db".to_string());
        tracing::info!(path = %path, "using the embedded SQLite backend");
        let store = Arc::new(SqliteStore::open(&path).await?);
        AppState::new(store.clone(), store)
    };

    let app = lineage_api::app(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
