//! Shared application state.

use std::sync::Arc;

use lineage_core::read_model::ReadModelStore;
use lineage_core::store::EventStore;
use lineage_history::HistoryService;

/// Application state shared across all request handlers. Both storage
/// backends fit behind the same pair of trait objects, so the handlers
/// never know which engine is underneath.
#[derive(Clone)]
pub struct AppState {
    /// The append-only event log.
    pub events: Arc<dyn EventStore>,
    /// The queryable read models.
    pub read_models: Arc<dyn ReadModelStore>,
    /// The history/audit query service.
    pub history: HistoryService,
}

impl AppState {
    /// Create new application state over one backend.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, read_models: Arc<dyn ReadModelStore>) -> Self {
        let history = HistoryService::new(events.clone(), read_models.clone());
        Self {
            events,
            read_models,
            history,
        }
    }
}
