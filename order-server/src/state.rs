//! Application state shared by the HTTP handlers

use std::sync::Arc;

use crate::cache::Cache;
use crate::db::OrderStore;
use crate::telemetry::Metrics;

/// Shared application state.
///
/// Handlers see the cache and the store only through their capability
/// traits, so tests substitute fakes without touching the router.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    /// Absent when no database DSN is configured (cache-only mode).
    pub store: Option<Arc<dyn OrderStore>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Option<Arc<dyn OrderStore>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            store,
            metrics,
        }
    }
}
