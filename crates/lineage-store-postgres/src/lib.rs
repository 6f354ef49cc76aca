//! Lineage Store (PostgreSQL) — the client-server backend.
//!
//! The append path runs its version check, event inserts, and projection
//! writes inside one sqlx transaction; the `UNIQUE (stream_id, version)`
//! constraint backstops the version check against concurrent writers, so
//! no advisory locking is needed.

mod apply;
mod read_models;
mod store;

pub use store::PgStore;
