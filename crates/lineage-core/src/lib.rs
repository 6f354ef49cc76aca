//! Lineage Core — shared domain model and store contracts.
//!
//! This crate defines the event model, the read-model record types, and the
//! traits the storage backends implement. It contains no infrastructure
//! code; `lineage-store-postgres` and `lineage-store-sqlite` provide the
//! two interchangeable implementations.

pub mod clock;
pub mod error;
pub mod event;
pub mod read_model;
pub mod store;
