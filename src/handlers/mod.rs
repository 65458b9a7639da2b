//! HTTP handlers for the relaygram health surface

use crate::metrics::Metrics;
use crate::models::ModelSelector;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod metrics;
pub mod status;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    selector: Arc<ModelSelector>,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(selector: Arc<ModelSelector>, metrics: Arc<Metrics>) -> Self {
        Self { selector, metrics }
    }

    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Router for `GET /`, `GET /health` and `GET /metrics`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
pub(crate) fn create_test_state(
    backend: Arc<crate::backend::ScriptedBackend>,
    models: &[&str],
) -> AppState {
    let selector = crate::models::selector::create_test_selector(backend, &["key-0"], models);
    let metrics = Arc::new(Metrics::new().expect("should create metrics"));
    AppState::new(Arc::new(selector), metrics)
}
