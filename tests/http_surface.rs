//! Integration tests for the health surface
//!
//! Sends requests through the full Axum router: `/` reports selector state,
//! `/health` answers for platform probes, `/metrics` exposes Prometheus text.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use relaygram::backend::{Behavior, ScriptedBackend};
use relaygram::handlers::{AppState, router};
use relaygram::metrics::Metrics;
use relaygram::models::{Credential, ExclusionSet, ModelId, ModelSelector, SelectorSettings};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn create_test_state(default: Behavior) -> AppState {
    let metrics = Arc::new(Metrics::new().expect("should create metrics"));
    let selector = Arc::new(ModelSelector::new(
        Arc::new(ScriptedBackend::new(default)),
        vec![Credential::new("key-0"), Credential::new("key-1")],
        SelectorSettings {
            fallback: vec![
                ModelId::new("gemini-2.0-flash"),
                ModelId::new("gemini-2.5-pro"),
            ],
            probe_prompt: "ping".to_string(),
            call_timeout: Duration::from_millis(200),
            discover_models: false,
        },
        metrics.clone(),
    ));
    AppState::new(selector, metrics)
}

async fn get(state: AppState, uri: &str) -> (StatusCode, String) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_returns_ok() {
    let (status, body) = get(create_test_state(Behavior::reply("pong")), "/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_health_stays_ok_when_backend_is_exhausted() {
    let state = create_test_state(Behavior::Quota);
    let _ = state.selector().select(&ExclusionSet::new()).await;

    let (status, _) = get(state, "/health").await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_reports_selecting_before_first_selection() {
    let (status, body) = get(create_test_state(Behavior::reply("pong")), "/").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "selecting");
    assert!(json["model"].is_null());
    assert_eq!(json["candidates"], 2);
    assert_eq!(json["exhausted_pairs"], 0);
}

#[tokio::test]
async fn test_status_reports_adopted_pair() {
    let state = create_test_state(Behavior::reply("pong"));
    state.selector().select(&ExclusionSet::new()).await.unwrap();

    let (_, body) = get(state, "/").await;

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "alive");
    assert_eq!(json["model"], "gemini-2.0-flash");
    assert_eq!(json["credential_index"], 0);
}

#[tokio::test]
async fn test_status_reports_exhaustion() {
    let state = create_test_state(Behavior::Quota);
    let _ = state.selector().select(&ExclusionSet::new()).await;

    let (_, body) = get(state, "/").await;

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "exhausted");
    assert_eq!(json["exhausted_pairs"], 4);
}

#[tokio::test]
async fn test_metrics_count_probes_by_outcome() {
    let state = create_test_state(Behavior::Quota);
    let _ = state.selector().select(&ExclusionSet::new()).await;

    let (status, body) = get(state, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("relaygram_probes_total{outcome=\"quota_exceeded\"} 4"));
    assert!(body.contains("relaygram_exhausted_pairs_total 4"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (status, _) = get(create_test_state(Behavior::reply("pong")), "/v1/chat").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
