//! Exclusion and exhaustion tests
//!
//! Tests request-scoped exclusion, exhaustion marking and release of the
//! adopted pair.

use super::*;
use crate::backend::{Behavior, ScriptedBackend};

#[tokio::test]
async fn test_excluded_pair_is_never_probed() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(
        backend.clone(),
        &["key-0"],
        &["gemini-2.0-flash", "gemini-2.5-pro"],
    );
    let mut exclude = ExclusionSet::new();
    exclude.insert(Pair::new("gemini-2.0-flash", CredentialIndex(0)));

    let pair = selector.select(&exclude).await.unwrap();

    assert_eq!(pair.model, ModelId::new("gemini-2.5-pro"));
    assert_eq!(backend.calls_for("gemini-2.0-flash", "key-0"), 0);
}

#[tokio::test]
async fn test_excluding_everything_exhausts_without_probes() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend.clone(), &["key-0"], &["gemini-2.0-flash"]);
    let mut exclude = ExclusionSet::new();
    exclude.insert(Pair::new("gemini-2.0-flash", CredentialIndex(0)));

    let err = selector.select(&exclude).await.unwrap_err();

    assert!(matches!(err, SelectorError::AllCombinationsExhausted { .. }));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_active_pair_is_not_reused_when_excluded() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(
        backend,
        &["key-0"],
        &["gemini-2.0-flash", "gemini-2.5-pro"],
    );
    let first = selector.select(&ExclusionSet::new()).await.unwrap();
    let mut exclude = ExclusionSet::new();
    exclude.insert(first.clone());

    let second = selector.active_or_select(&exclude).await.unwrap();

    assert_ne!(first, second);
}

#[tokio::test]
async fn test_mark_exhausted_is_idempotent_and_clears_active() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend, &["key-0"], &["gemini-2.0-flash"]);
    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert!(selector.mark_exhausted(&pair).await);
    assert!(!selector.mark_exhausted(&pair).await);
    assert_eq!(selector.active().await, None);
    assert_eq!(selector.snapshot().await.exhausted_pairs, 1);
}

#[tokio::test]
async fn test_release_keeps_pair_selectable() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend, &["key-0"], &["gemini-2.0-flash"]);
    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    selector.release(&pair).await;

    assert_eq!(selector.active().await, None);
    assert!(!selector.is_exhausted(&pair).await);
    assert_eq!(selector.select(&ExclusionSet::new()).await.unwrap(), pair);
}

#[tokio::test]
async fn test_release_of_other_pair_keeps_active() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend, &["key-0"], &["gemini-2.0-flash"]);
    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    selector
        .release(&Pair::new("gemini-2.5-pro", CredentialIndex(0)))
        .await;

    assert_eq!(selector.active().await, Some(pair));
}

#[tokio::test]
async fn test_not_found_probe_does_not_exhaust() {
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::reply("pong"))
            .with("gemini-2.0-flash", "key-0", Behavior::NotFound),
    );
    let selector = create_test_selector(
        backend,
        &["key-0"],
        &["gemini-2.0-flash", "gemini-2.5-pro"],
    );

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(pair.model, ModelId::new("gemini-2.5-pro"));
    assert!(
        !selector
            .is_exhausted(&Pair::new("gemini-2.0-flash", CredentialIndex(0)))
            .await
    );
}
