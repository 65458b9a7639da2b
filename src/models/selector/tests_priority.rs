//! Priority ordering tests
//!
//! Tests that candidates are probed in ranked order and that catalog discovery
//! merges with the static fallback list.

use super::*;
use crate::backend::{Behavior, ScriptedBackend};

fn discovering_selector(backend: Arc<ScriptedBackend>, fallback: &[&str]) -> ModelSelector {
    let settings = SelectorSettings {
        fallback: fallback.iter().map(ModelId::new).collect(),
        probe_prompt: "ping".to_string(),
        call_timeout: Duration::from_millis(200),
        discover_models: true,
    };
    ModelSelector::new(
        backend,
        vec![Credential::new("key-0"), Credential::new("key-1")],
        settings,
        Arc::new(Metrics::new().unwrap()),
    )
}

#[tokio::test]
async fn test_probes_follow_priority_order() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::NotFound));
    let selector = create_test_selector(
        backend.clone(),
        &["key-0"],
        &["gemini-2.5-pro", "gemini-2.0-flash", "gemini-2.0-flash-lite"],
    );

    let _ = selector.select(&ExclusionSet::new()).await;

    let probed: Vec<String> = backend
        .calls()
        .into_iter()
        .map(|(model, _)| model.to_string())
        .collect();
    assert_eq!(
        probed,
        vec!["gemini-2.0-flash-lite", "gemini-2.0-flash", "gemini-2.5-pro"]
    );
}

#[tokio::test]
async fn test_higher_ranked_working_model_wins() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(
        backend.clone(),
        &["key-0"],
        &["gemini-2.5-pro", "gemini-2.0-flash-exp"],
    );

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(pair.model, ModelId::new("gemini-2.0-flash-exp"));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_discover_merges_catalog_with_fallback() {
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::reply("pong"))
            .with_catalog(["models/gemini-2.0-flash-exp", "models/gemini-2.0-flash"]),
    );
    let selector = discovering_selector(backend.clone(), &["gemini-2.0-flash", "gemini-1.5-pro"]);

    let count = selector.discover().await;

    assert_eq!(count, 3);
    assert_eq!(
        selector.candidates().await,
        vec![
            ModelId::new("gemini-2.0-flash-exp"),
            ModelId::new("gemini-2.0-flash"),
            ModelId::new("gemini-1.5-pro"),
        ]
    );
    assert_eq!(backend.catalog_calls(), 1, "first credential answered");
}

#[tokio::test]
async fn test_discover_falls_back_when_catalog_fails() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")).with_catalog_failure());
    let selector = discovering_selector(backend.clone(), &["gemini-1.5-pro", "gemini-2.0-flash"]);

    let count = selector.discover().await;

    assert_eq!(count, 2);
    assert_eq!(
        selector.candidates().await,
        vec![ModelId::new("gemini-2.0-flash"), ModelId::new("gemini-1.5-pro")]
    );
    assert_eq!(backend.catalog_calls(), 2, "every credential was tried");
}

#[tokio::test]
async fn test_discover_disabled_skips_catalog() {
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::reply("pong")).with_catalog(["models/gemini-2.0-flash-exp"]),
    );
    let selector = create_test_selector(backend.clone(), &["key-0"], &["gemini-2.0-flash"]);

    assert_eq!(selector.discover().await, 1);
    assert_eq!(backend.catalog_calls(), 0);
}
