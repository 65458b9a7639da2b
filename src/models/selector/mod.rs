//! Model/credential selection
//!
//! Finds a working (model, credential) pair by probing ranked candidates under
//! each credential slot in turn, remembers which pairs ran out of quota, and
//! keeps the adopted pair until a failure releases it.
//!
//! Production code is in this file, tests are organized in sibling modules:
//! - tests_basic: Adoption, credential rotation, verdicts, timeouts
//! - tests_priority: Ranked probing order and catalog discovery
//! - tests_exclusion: Request-scoped exclusion and exhaustion marking

use crate::backend::{GenerateRequest, GenerativeBackend};
use crate::config::Config;
use crate::error::{BackendError, SelectorError};
use crate::metrics::{Metrics, Outcome};
use crate::models::catalog::{merge_candidates, static_fallback};
use crate::models::exhaustion::ExhaustionTable;
use crate::models::pair::{Credential, CredentialIndex, ExclusionSet, ModelId, Pair};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Selector knobs taken from configuration
#[derive(Debug, Clone)]
pub struct SelectorSettings {
    /// Static fallback list, used alone when the catalog cannot be fetched
    pub fallback: Vec<ModelId>,
    pub probe_prompt: String,
    /// Upper bound for every backend call, probes included
    pub call_timeout: Duration,
    pub discover_models: bool,
}

impl SelectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fallback: static_fallback(&config.backend.fallback_models),
            probe_prompt: config.backend.probe_prompt.clone(),
            call_timeout: config.call_timeout(),
            discover_models: config.backend.discover_models,
        }
    }
}

/// Coarse selector state for the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorStatus {
    /// A pair is adopted
    Alive,
    /// No pair adopted yet, or the last one was released
    Selecting,
    /// Every combination is marked exhausted
    Exhausted,
}

/// Serializable view of the selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorSnapshot {
    pub status: SelectorStatus,
    pub model: Option<ModelId>,
    pub credential_index: Option<CredentialIndex>,
    pub candidates: usize,
    pub exhausted_pairs: usize,
}

#[derive(Debug, Default)]
struct SelectorState {
    current_credential: usize,
    active: Option<Pair>,
    exhausted: ExhaustionTable,
    candidates: Vec<ModelId>,
}

/// Chooses and tracks the (model, credential) pair used for generation
///
/// All mutable state sits behind one `RwLock`; no guard is held across a
/// backend call, so concurrent requests only contend on bookkeeping.
pub struct ModelSelector {
    backend: Arc<dyn GenerativeBackend>,
    credentials: Vec<Credential>,
    settings: SelectorSettings,
    metrics: Arc<Metrics>,
    state: RwLock<SelectorState>,
}

impl std::fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelector")
            .field("credentials", &self.credentials.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ModelSelector {
    /// Create a selector whose candidates start as the ranked fallback list
    ///
    /// Call [`discover`](Self::discover) to merge in the backend catalog.
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        credentials: Vec<Credential>,
        settings: SelectorSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let state = SelectorState {
            candidates: merge_candidates(&[], &settings.fallback),
            ..SelectorState::default()
        };
        Self {
            backend,
            credentials,
            settings,
            metrics,
            state: RwLock::new(state),
        }
    }

    /// Refresh candidates from the backend catalog
    ///
    /// The catalog is fetched with the first credential that answers. When no
    /// credential answers, the static fallback list is used alone. Returns the
    /// number of candidates.
    pub async fn discover(&self) -> usize {
        let mut catalog: Vec<ModelId> = Vec::new();

        if self.settings.discover_models {
            for (index, credential) in self.credentials.iter().enumerate() {
                match self.backend.list_models(credential).await {
                    Ok(models) => {
                        tracing::info!(
                            credential_index = index,
                            catalog_models = models.len(),
                            "Fetched model catalog"
                        );
                        catalog = models;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            credential_index = index,
                            error = %e,
                            "Model catalog request failed, trying next credential"
                        );
                    }
                }
            }
            if catalog.is_empty() {
                tracing::warn!(
                    fallback_models = self.settings.fallback.len(),
                    "Model catalog unavailable, using static fallback list"
                );
            }
        }

        let candidates = merge_candidates(&catalog, &self.settings.fallback);
        let count = candidates.len();
        tracing::debug!(candidates = ?candidates, "Ranked candidate models");
        self.state.write().await.candidates = candidates;
        count
    }

    /// Run the selection algorithm and adopt the first pair that answers
    ///
    /// Credential slots are visited circularly starting at the current slot,
    /// each once. Within a slot, candidates are probed in ranked order,
    /// skipping exhausted and excluded pairs. A quota failure marks the pair
    /// exhausted; a not-found failure skips it without marking. Transient and
    /// other failures are skipped too, and turn the final verdict into
    /// `BackendUnavailable`.
    ///
    /// # Performance
    /// At most `credentials × candidates` probes per call.
    pub async fn select(&self, exclude: &ExclusionSet) -> Result<Pair, SelectorError> {
        if self.credentials.is_empty() {
            tracing::error!("No backend credentials configured - check environment");
            self.metrics.record_selection(Outcome::Failed);
            return Err(SelectorError::NoCredentialsConfigured);
        }

        let (start, candidates) = {
            let state = self.state.read().await;
            (state.current_credential, state.candidates.clone())
        };
        let slots = self.credentials.len();
        let mut last_failure: Option<BackendError> = None;
        let mut probes = 0usize;

        for offset in 0..slots {
            let slot = CredentialIndex((start + offset) % slots);

            for model in &candidates {
                let pair = Pair::new(model.clone(), slot);

                if exclude.contains(&pair) {
                    tracing::debug!(pair = %pair, "Skipping excluded pair");
                    continue;
                }
                if self.is_exhausted(&pair).await {
                    continue;
                }

                probes += 1;
                match self.probe(&pair).await {
                    Ok(text) if !text.trim().is_empty() => {
                        self.metrics.record_probe(Outcome::Success);
                        self.metrics.record_selection(Outcome::Success);
                        {
                            let mut state = self.state.write().await;
                            state.current_credential = slot.0;
                            state.active = Some(pair.clone());
                        }
                        tracing::info!(
                            model = %pair.model,
                            credential_index = slot.0,
                            probes = probes,
                            "Adopted model/credential pair"
                        );
                        return Ok(pair);
                    }
                    Ok(_) => {
                        self.metrics.record_probe(Outcome::Empty);
                        tracing::debug!(pair = %pair, "Probe returned no text");
                    }
                    Err(e) => {
                        self.metrics.record_probe(Outcome::from_error(&e));
                        if e.is_quota() {
                            self.mark_exhausted(&pair).await;
                        } else if e.is_model_unavailable() {
                            tracing::debug!(pair = %pair, error = %e, "Model unavailable");
                        } else {
                            tracing::warn!(
                                pair = %pair,
                                error_kind = e.kind(),
                                error = %e,
                                "Probe failed"
                            );
                            last_failure = Some(e);
                        }
                    }
                }
            }
        }

        self.state.write().await.active = None;

        match last_failure {
            Some(e) => {
                self.metrics.record_selection(Outcome::Transient);
                tracing::error!(
                    probes = probes,
                    error = %e,
                    "No pair answered; backend unavailable"
                );
                Err(SelectorError::BackendUnavailable {
                    reason: e.to_string(),
                })
            }
            None => {
                self.metrics.record_selection(Outcome::QuotaExceeded);
                tracing::error!(
                    probes = probes,
                    credentials = slots,
                    models = candidates.len(),
                    "All model/credential combinations exhausted or unavailable"
                );
                Err(SelectorError::AllCombinationsExhausted {
                    credentials: slots,
                    models: candidates.len(),
                })
            }
        }
    }

    /// The adopted pair, if any
    pub async fn active(&self) -> Option<Pair> {
        self.state.read().await.active.clone()
    }

    /// Reuse the adopted pair unless it is excluded, otherwise select
    pub async fn active_or_select(&self, exclude: &ExclusionSet) -> Result<Pair, SelectorError> {
        if let Some(pair) = self.active().await {
            if !exclude.contains(&pair) && !self.is_exhausted(&pair).await {
                return Ok(pair);
            }
        }
        self.select(exclude).await
    }

    /// Record a quota failure for `pair`
    ///
    /// Idempotent. Clears the adopted pair when it is `pair`. Returns `true`
    /// when the pair was newly marked.
    pub async fn mark_exhausted(&self, pair: &Pair) -> bool {
        let newly = {
            let mut state = self.state.write().await;
            if state.active.as_ref() == Some(pair) {
                state.active = None;
            }
            state.exhausted.mark(pair)
        };
        if newly {
            self.metrics.record_exhausted_pair();
            tracing::warn!(
                model = %pair.model,
                credential_index = pair.credential.0,
                "Marked pair exhausted"
            );
        }
        newly
    }

    /// Drop `pair` as the adopted pair without marking it exhausted
    pub async fn release(&self, pair: &Pair) {
        let mut state = self.state.write().await;
        if state.active.as_ref() == Some(pair) {
            state.active = None;
            tracing::info!(pair = %pair, "Released model/credential pair");
        }
    }

    pub async fn is_exhausted(&self, pair: &Pair) -> bool {
        self.state.read().await.exhausted.is_exhausted(pair)
    }

    /// Generate with `pair`, bounded by the per-call timeout
    pub async fn generate(
        &self,
        pair: &Pair,
        request: &GenerateRequest,
    ) -> Result<String, BackendError> {
        let credential =
            self.credentials
                .get(pair.credential.0)
                .ok_or_else(|| BackendError::Rejected {
                    status: 401,
                    message: format!("credential slot {} is not configured", pair.credential),
                })?;

        let timeout = self.settings.call_timeout;
        match tokio::time::timeout(
            timeout,
            self.backend.generate(&pair.model, credential, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                timeout_seconds: timeout.as_secs(),
            }),
        }
    }

    async fn probe(&self, pair: &Pair) -> Result<String, BackendError> {
        let request = GenerateRequest::probe(&self.settings.probe_prompt);
        self.generate(pair, &request).await
    }

    /// Status view for the health surface
    pub async fn snapshot(&self) -> SelectorSnapshot {
        let state = self.state.read().await;
        let status = if state.active.is_some() {
            SelectorStatus::Alive
        } else if state
            .exhausted
            .covers(&state.candidates, self.credentials.len())
        {
            SelectorStatus::Exhausted
        } else {
            SelectorStatus::Selecting
        };
        SelectorSnapshot {
            status,
            model: state.active.as_ref().map(|p| p.model.clone()),
            credential_index: state.active.as_ref().map(|p| p.credential),
            candidates: state.candidates.len(),
            exhausted_pairs: state.exhausted.len(),
        }
    }

    /// Number of (model, credential) combinations, the probe bound of one selection
    pub async fn combination_count(&self) -> usize {
        self.credentials.len() * self.state.read().await.candidates.len()
    }

    /// Ranked candidate models
    pub async fn candidates(&self) -> Vec<ModelId> {
        self.state.read().await.candidates.clone()
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}

#[cfg(test)]
mod tests_basic;

#[cfg(test)]
mod tests_exclusion;

#[cfg(test)]
mod tests_priority;

/// Shared test fixture: a selector over a scripted backend
#[cfg(test)]
pub(crate) fn create_test_selector(
    backend: Arc<crate::backend::ScriptedBackend>,
    credentials: &[&str],
    models: &[&str],
) -> ModelSelector {
    let settings = SelectorSettings {
        fallback: models.iter().map(ModelId::new).collect(),
        probe_prompt: "ping".to_string(),
        call_timeout: Duration::from_millis(200),
        discover_models: false,
    };
    let metrics = Arc::new(Metrics::new().expect("should create metrics"));
    ModelSelector::new(
        backend,
        credentials.iter().map(|c| Credential::new(*c)).collect(),
        settings,
        metrics,
    )
}
