//! Lineage Projection — the synchronous projector.
//!
//! The projector is a pure transformation: given a domain event, the
//! records it needs ([`required_reads`]), and those records loaded from the
//! current read models, [`project`] computes the read-model mutations the
//! event implies. The storage backends execute the mutations inside the
//! same transaction as the event append, so an event and its projection
//! commit or roll back together.
//!
//! Keeping the projector free of storage concerns is deliberate: if
//! write/read scaling ever demands asynchronous projections, this unit
//! moves into a position-tracking consumer loop without touching the
//! append contract.

mod diff;
mod projector;

pub use diff::{PROTECTED_FIELDS, apply_changes};
pub use projector::{
    EventContext, LoadedRecords, Mutation, ProjectionError, RecordRef, project, required_reads,
};
