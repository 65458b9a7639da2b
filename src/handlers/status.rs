//! Selector status endpoint
//!
//! `GET /` reports whether a model/credential pair is adopted, which one, and
//! how many combinations are exhausted. Credentials themselves never appear.

use axum::{Json, extract::State, http::StatusCode};

use crate::handlers::AppState;
use crate::models::SelectorSnapshot;

pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<SelectorSnapshot>) {
    (StatusCode::OK, Json(state.selector().snapshot().await))
}
