//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use axum::extract::State;

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` with a JSON error body if metrics collection
///   fails
pub async fn handler(State(state): State<AppState>) -> AppResult<String> {
    state.metrics().gather().map_err(|e| {
        tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
        AppError::Internal(format!("Failed to gather metrics: {}", e))
    })
}
