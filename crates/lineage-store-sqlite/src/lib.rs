//! Lineage Store (SQLite) — the embedded single-file backend.
//!
//! One `tokio_rusqlite` connection serializes all access; the append path
//! runs its version check, event inserts, and projection writes inside a
//! single rusqlite transaction on that connection, so an event and its
//! projection commit or roll back together.

mod apply;
mod encode;
mod err;
mod read_models;
mod schema;
mod store;

pub use store::SqliteStore;
