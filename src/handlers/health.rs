//! Health check endpoint
//!
//! Liveness probe for the hosting platform and the self-ping loop. Always 200
//! while the process serves HTTP, whatever the selector state.

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}
