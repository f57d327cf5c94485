//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// In-memory record store backing the REST API.
    pub registry: Arc<EventRegistry>,
}
