//! Integration tests for model/credential failover
//!
//! Exercises the selector against scripted backends: the two-key scenario,
//! exhaustion monotonicity across repeated sweeps, and property tests over
//! arbitrary credential/model grids.

use proptest::prelude::*;
use relaygram::backend::{Behavior, ScriptedBackend};
use relaygram::error::SelectorError;
use relaygram::metrics::Metrics;
use relaygram::models::scoring::{priority_score, rank};
use relaygram::models::{
    Credential, CredentialIndex, ExclusionSet, ModelId, ModelSelector, Pair, SelectorSettings,
    SelectorStatus,
};
use std::sync::Arc;
use std::time::Duration;

fn key(i: usize) -> String {
    format!("key-{}", i)
}

fn model(i: usize) -> String {
    format!("model-{}", i)
}

fn build_selector(backend: Arc<ScriptedBackend>, keys: usize, models: &[String]) -> ModelSelector {
    let settings = SelectorSettings {
        fallback: models.iter().map(ModelId::new).collect(),
        probe_prompt: "ping".to_string(),
        call_timeout: Duration::from_millis(500),
        discover_models: false,
    };
    ModelSelector::new(
        backend,
        (0..keys).map(|i| Credential::new(key(i))).collect(),
        settings,
        Arc::new(Metrics::new().expect("should create metrics")),
    )
}

#[tokio::test]
async fn test_second_key_serves_flash_lite_when_first_key_is_exhausted() {
    let models: Vec<String> = ["gemini-2.5-pro", "gemini-2.0-flash", "gemini-2.0-flash-lite"]
        .iter()
        .map(|m| m.to_string())
        .collect();
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::Quota)
            .with("gemini-2.0-flash-lite", "key-1", Behavior::reply("pong")),
    );
    let selector = build_selector(backend.clone(), 2, &models);

    let pair = selector.select(&ExclusionSet::new()).await.unwrap();

    assert_eq!(pair, Pair::new("gemini-2.0-flash-lite", CredentialIndex(1)));
    assert!(backend.call_count() <= 6);

    let snapshot = selector.snapshot().await;
    assert_eq!(snapshot.status, SelectorStatus::Alive);
    assert_eq!(snapshot.credential_index, Some(CredentialIndex(1)));
    assert_eq!(snapshot.exhausted_pairs, 3);
}

#[tokio::test]
async fn test_exhausted_pairs_stay_exhausted_across_sweeps() {
    let models: Vec<String> = (0..3).map(model).collect();
    let backend = Arc::new(ScriptedBackend::new(Behavior::Quota));
    let selector = build_selector(backend.clone(), 2, &models);

    for _ in 0..3 {
        let err = selector.select(&ExclusionSet::new()).await.unwrap_err();
        assert!(matches!(err, SelectorError::AllCombinationsExhausted { .. }));
    }

    // Quota recovers on the backend side, but the process never re-probes
    for m in &models {
        for k in 0..2 {
            backend.set(m, &key(k), Behavior::reply("pong"));
        }
    }
    let err = selector.select(&ExclusionSet::new()).await.unwrap_err();

    assert!(matches!(err, SelectorError::AllCombinationsExhausted { .. }));
    assert_eq!(backend.call_count(), 6, "each pair probed exactly once");
}

#[tokio::test]
async fn test_concurrent_selections_agree_on_single_working_pair() {
    let models: Vec<String> = (0..4).map(model).collect();
    let backend = Arc::new(
        ScriptedBackend::new(Behavior::Quota).with("model-2", "key-1", Behavior::reply("pong")),
    );
    let selector = Arc::new(build_selector(backend, 2, &models));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let selector = Arc::clone(&selector);
            tokio::spawn(async move { selector.select(&ExclusionSet::new()).await })
        })
        .collect();

    for handle in handles {
        let pair = handle.await.unwrap().unwrap();
        assert_eq!(pair, Pair::new("model-2", CredentialIndex(1)));
    }
    assert_eq!(
        selector.active().await,
        Some(Pair::new("model-2", CredentialIndex(1)))
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_single_accepting_pair_is_found_within_bound(
        keys in 1usize..4,
        models in 1usize..5,
        seed in any::<(usize, usize)>(),
    ) {
        let accept_key = seed.0 % keys;
        let accept_model = seed.1 % models;
        let names: Vec<String> = (0..models).map(model).collect();
        let backend = Arc::new(
            ScriptedBackend::new(Behavior::Quota)
                .with(&model(accept_model), &key(accept_key), Behavior::reply("pong")),
        );
        let selector = build_selector(backend.clone(), keys, &names);

        let pair = tokio_test::block_on(selector.select(&ExclusionSet::new())).unwrap();

        prop_assert_eq!(pair, Pair::new(model(accept_model), CredentialIndex(accept_key)));
        prop_assert!(backend.call_count() <= keys * models);
    }

    #[test]
    fn prop_all_quota_exhausts_after_exactly_every_combination(
        keys in 1usize..4,
        models in 1usize..5,
    ) {
        let names: Vec<String> = (0..models).map(model).collect();
        let backend = Arc::new(ScriptedBackend::new(Behavior::Quota));
        let selector = build_selector(backend.clone(), keys, &names);

        let err = tokio_test::block_on(selector.select(&ExclusionSet::new())).unwrap_err();

        prop_assert_eq!(
            err,
            SelectorError::AllCombinationsExhausted { credentials: keys, models }
        );
        prop_assert_eq!(backend.call_count(), keys * models);
    }

    #[test]
    fn prop_exhausted_pairs_are_never_selected(
        keys in 1usize..4,
        models in 2usize..5,
        exhausted in proptest::collection::vec(any::<(usize, usize)>(), 0..8),
    ) {
        let names: Vec<String> = (0..models).map(model).collect();
        let backend = Arc::new(ScriptedBackend::new(Behavior::reply("pong")));
        let selector = build_selector(backend, keys, &names);

        let marked: Vec<Pair> = exhausted
            .iter()
            .map(|(k, m)| Pair::new(model(m % models), CredentialIndex(k % keys)))
            .collect();

        tokio_test::block_on(async {
            for pair in &marked {
                selector.mark_exhausted(pair).await;
            }
            for _ in 0..3 {
                match selector.select(&ExclusionSet::new()).await {
                    Ok(pair) => {
                        assert!(!marked.contains(&pair), "selected exhausted pair {}", pair);
                        selector.release(&pair).await;
                    }
                    Err(e) => {
                        assert!(matches!(e, SelectorError::AllCombinationsExhausted { .. }));
                    }
                }
            }
            for pair in &marked {
                assert!(selector.is_exhausted(pair).await);
            }
        });
    }

    #[test]
    fn prop_ranking_is_a_sorted_permutation(
        names in proptest::collection::vec(
            "(gemini|model)-(1\\.5|2\\.0|2\\.5)(-flash|-pro|-lite|-exp|-8b|-tts|-vision)?",
            0..12,
        ),
    ) {
        let ids: Vec<ModelId> = names.iter().map(ModelId::new).collect();
        let ranked = rank(ids.clone());

        prop_assert_eq!(ranked.len(), ids.len());
        for pair in ranked.windows(2) {
            prop_assert!(priority_score(&pair[0]) >= priority_score(&pair[1]));
        }
        let mut sorted_input = ids;
        sorted_input.sort();
        let mut sorted_output = ranked.clone();
        sorted_output.sort();
        prop_assert_eq!(sorted_input, sorted_output);
        prop_assert_eq!(rank(ranked.clone()), ranked);
    }
}
