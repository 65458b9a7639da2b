//! Basic selection tests
//!
//! Tests adoption of the first answering pair, credential rotation, the final
//! verdicts when nothing answers, probe timeouts and the status snapshot.

use super::*;
use crate::backend::{Behavior, ScriptedBackend};

#[tokio::test]
async fn test_adopts_first_answering_pair() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend.clone(), &["key-0"], &["gemini-2.0-flash"]);

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(pair, Pair::new("gemini-2.0-flash", CredentialIndex(0)));
    assert_eq!(selector.active().await, Some(pair));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_second_credential_serves_after_first_is_exhausted() {
    // Credential 0 is out of quota everywhere; credential 1 serves flash-lite only
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::Quota)
            .with("gemini-2.0-flash-lite", "key-1", Behavior::reply("pong")),
    );
    let selector = create_test_selector(
        backend.clone(),
        &["key-0", "key-1"],
        &["gemini-2.5-pro", "gemini-2.0-flash", "gemini-2.0-flash-lite"],
    );

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(pair, Pair::new("gemini-2.0-flash-lite", CredentialIndex(1)));
    assert_eq!(backend.call_count(), 4, "three probes on key-0, one on key-1");
    for model in ["gemini-2.5-pro", "gemini-2.0-flash", "gemini-2.0-flash-lite"] {
        assert!(
            selector
                .is_exhausted(&Pair::new(model, CredentialIndex(0)))
                .await
        );
    }
    assert!(
        !selector
            .is_exhausted(&Pair::new("gemini-2.0-flash-lite", CredentialIndex(1)))
            .await
    );
}

#[tokio::test]
async fn test_no_credentials_is_reported() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend.clone(), &[], &["gemini-2.0-flash"]);

    let err = selector.select(&ExclusionSet::new()).await.unwrap_err();

    assert_eq!(err, SelectorError::NoCredentialsConfigured);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_all_quota_exhausts_after_every_combination() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::Quota));
    let selector = create_test_selector(
        backend.clone(),
        &["key-0", "key-1"],
        &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-2.5-pro"],
    );

    let err = selector.select(&ExclusionSet::new()).await.unwrap_err();

    assert_eq!(
        err,
        SelectorError::AllCombinationsExhausted {
            credentials: 2,
            models: 3
        }
    );
    assert_eq!(backend.call_count(), 6);
    assert_eq!(selector.snapshot().await.status, SelectorStatus::Exhausted);

    // Exhausted pairs are not probed again
    let again = selector.select(&ExclusionSet::new()).await.unwrap_err();
    assert!(matches!(again, SelectorError::AllCombinationsExhausted { .. }));
    assert_eq!(backend.call_count(), 6);
}

#[tokio::test]
async fn test_transient_probe_failure_reports_backend_unavailable() {
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::Quota).with("gemini-2.0-flash", "key-0", Behavior::Transient),
    );
    let selector = create_test_selector(
        backend.clone(),
        &["key-0"],
        &["gemini-2.0-flash", "gemini-2.5-pro"],
    );

    let err = selector.select(&ExclusionSet::new()).await.unwrap_err();

    assert!(matches!(err, SelectorError::BackendUnavailable { .. }));
    assert!(
        !selector
            .is_exhausted(&Pair::new("gemini-2.0-flash", CredentialIndex(0)))
            .await,
        "transient failures never exhaust"
    );
}

#[tokio::test]
async fn test_hanging_probe_times_out() {
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::reply("pong")).with("gemini-2.0-flash", "key-0", Behavior::Hang),
    );
    let selector = create_test_selector(
        backend.clone(),
        &["key-0"],
        &["gemini-2.0-flash", "gemini-2.5-pro"],
    );

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(pair, Pair::new("gemini-2.5-pro", CredentialIndex(0)));
    assert_eq!(backend.calls_for("gemini-2.0-flash", "key-0"), 1);
}

#[tokio::test]
async fn test_generate_maps_elapsed_timeout() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::Hang));
    let selector = create_test_selector(backend, &["key-0"], &["gemini-2.0-flash"]);

    let err = selector
        .generate(
            &Pair::new("gemini-2.0-flash", CredentialIndex(0)),
            &GenerateRequest::probe("hi"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_empty_probe_reply_is_skipped_without_exhaustion() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::Empty));
    let selector = create_test_selector(backend.clone(), &["key-0"], &["gemini-2.0-flash"]);

    let err = selector.select(&ExclusionSet::new()).await.unwrap_err();

    assert!(matches!(err, SelectorError::AllCombinationsExhausted { .. }));
    assert_eq!(selector.snapshot().await.exhausted_pairs, 0);
}

#[tokio::test]
async fn test_cursor_starts_at_last_adopted_credential() {
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::Quota)
            .with("gemini-2.0-flash", "key-1", Behavior::reply("pong")),
    );
    let selector = create_test_selector(backend.clone(), &["key-0", "key-1"], &["gemini-2.0-flash"]);

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();
    selector.release(&pair).await;
    let calls_before = backend.call_count();

    let again = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(again, pair);
    assert_eq!(backend.call_count(), calls_before + 1);
    assert_eq!(
        backend.calls().last().map(|(_, key)| key.clone()),
        Some("key-1".to_string())
    );
}

#[tokio::test]
async fn test_active_or_select_reuses_active_pair() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend.clone(), &["key-0"], &["gemini-2.0-flash"]);

    let first = selector.active_or_select(&ExclusionSet::new()).await.unwrap();
    let second = selector.active_or_select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.call_count(), 1, "second call reuses the adopted pair");
}

#[tokio::test]
async fn test_snapshot_reports_active_pair() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(
        backend,
        &["key-0", "key-1"],
        &["gemini-2.0-flash", "gemini-2.5-pro"],
    );

    let before = selector.snapshot().await;
    assert_eq!(before.status, SelectorStatus::Selecting);
    assert_eq!(before.model, None);
    assert_eq!(before.candidates, 2);

    selector.select(&ExclusionSet::new()).await.unwrap();
    let after = selector.snapshot().await;
    assert_eq!(after.status, SelectorStatus::Alive);
    assert_eq!(after.model, Some(ModelId::new("gemini-2.0-flash")));
    assert_eq!(after.credential_index, Some(CredentialIndex(0)));
    assert_eq!(selector.combination_count().await, 4);
}

#[tokio::test]
async fn test_snapshot_serializes_lowercase_status() {
    let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
    let selector = create_test_selector(backend, &["key-0"], &["gemini-2.0-flash"]);

    let json = serde_json::to_value(selector.snapshot().await).unwrap();

    assert_eq!(json["status"], "selecting");
    assert!(json["model"].is_null());
    assert_eq!(json["candidates"], 1);
}
