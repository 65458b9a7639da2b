//! Prompt/reply pipeline with failover and retry
//!
//! Turns one user request into one reply. The pipeline asks the selector for a
//! pair and reacts to classified failures: quota exhausts the pair and
//! reselects, not-found excludes the pair for this request and reselects, and
//! transient failures repeat the same pair after an exponential backoff.

pub mod history;
pub mod media;
pub mod persona;
pub mod prompt;

pub use history::{ConversationHistory, Turn};
pub use media::ScratchFile;
pub use persona::{Persona, PersonaRules};

use crate::backend::GenerateRequest;
use crate::config::Config;
use crate::error::{BackendError, PipelineError, SelectorError};
use crate::metrics::{Metrics, Outcome};
use crate::models::{ExclusionSet, ModelSelector, Pair};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default number of repeats after a transient failure
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base backoff in milliseconds (doubles each retry)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;
/// Maximum backoff duration in milliseconds (30 seconds)
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Correlates the log lines of one chat update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transient retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Repeats of the same pair after a transient failure (at least 1)
    max_retries: usize,
    /// Base backoff in milliseconds (doubles each retry)
    retry_backoff_ms: u64,
}

impl RetryPolicy {
    /// Create a retry policy
    ///
    /// # Errors
    /// Returns an error if `max_retries` is 0
    pub fn new(max_retries: usize, retry_backoff_ms: u64) -> Result<Self, &'static str> {
        if max_retries == 0 {
            return Err("max_retries must be at least 1");
        }
        Ok(Self {
            max_retries,
            retry_backoff_ms,
        })
    }

    /// Policy from the `[retry]` section, validated at config load
    pub fn from_config(config: &Config) -> Result<Self, &'static str> {
        Self::new(
            config.retry.max_transient_retries,
            config.retry.retry_backoff_ms,
        )
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn retry_backoff_ms(&self) -> u64 {
        self.retry_backoff_ms
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

/// Exponential backoff with overflow protection
///
/// `base * 2^(attempt-1)` for a 1-indexed attempt, capped at [`MAX_BACKOFF_MS`].
pub fn calculate_backoff(policy: &RetryPolicy, attempt: usize) -> u64 {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    policy
        .retry_backoff_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_BACKOFF_MS)
}

/// Generation entry point shared by every chat update
pub struct Pipeline {
    selector: Arc<ModelSelector>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(selector: Arc<ModelSelector>, policy: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            selector,
            policy,
            metrics,
        }
    }

    pub fn selector(&self) -> &Arc<ModelSelector> {
        &self.selector
    }

    /// Generate a reply for `request`
    ///
    /// The loop runs at most `combinations + max_retries` times: every quota
    /// or not-found failure consumes one pair, every transient failure one
    /// retry.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        request_id: RequestId,
    ) -> Result<String, PipelineError> {
        if request.parts.iter().all(|part| part.is_empty()) {
            return Err(PipelineError::EmptyInput);
        }

        let mut exclude = ExclusionSet::new();
        let mut transient_failures = 0usize;
        let mut last_error: Option<BackendError> = None;
        let mut last_pair: Option<Pair> = None;
        let bound = self.selector.combination_count().await + self.policy.max_retries();

        for iteration in 1..=bound.max(1) {
            let pair = match self.selector.active_or_select(&exclude).await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        iteration = iteration,
                        excluded = exclude.len(),
                        error = %e,
                        "No model/credential pair available"
                    );
                    self.metrics.record_generation(Outcome::Failed);
                    return Err(e.into());
                }
            };

            tracing::debug!(
                request_id = %request_id,
                model = %pair.model,
                credential_index = pair.credential.0,
                iteration = iteration,
                "Attempting generation"
            );

            match self.selector.generate(&pair, request).await {
                Ok(text) => {
                    tracing::info!(
                        request_id = %request_id,
                        model = %pair.model,
                        credential_index = pair.credential.0,
                        response_length = text.len(),
                        "Generation completed"
                    );
                    self.metrics.record_generation(Outcome::Success);
                    return Ok(text);
                }
                Err(e) if e.is_quota() => {
                    tracing::warn!(
                        request_id = %request_id,
                        model = %pair.model,
                        credential_index = pair.credential.0,
                        error = %e,
                        "Quota exceeded, selecting another pair"
                    );
                    self.selector.mark_exhausted(&pair).await;
                    transient_failures = 0;
                    last_error = Some(e);
                }
                Err(e) if e.is_model_unavailable() => {
                    tracing::warn!(
                        request_id = %request_id,
                        model = %pair.model,
                        credential_index = pair.credential.0,
                        error = %e,
                        "Model unavailable, excluding it for this request"
                    );
                    self.exclude(&pair, &mut exclude).await;
                    transient_failures = 0;
                    last_error = Some(e);
                }
                Err(e) if e.is_transient() => {
                    transient_failures += 1;
                    if transient_failures > self.policy.max_retries() {
                        tracing::error!(
                            request_id = %request_id,
                            model = %pair.model,
                            attempts = transient_failures,
                            error = %e,
                            "Transient failures persisted, giving up"
                        );
                        self.metrics.record_generation(Outcome::Transient);
                        self.selector.release(&pair).await;
                        return Err(PipelineError::RetriesExhausted {
                            attempts: transient_failures,
                            last_error: e,
                        });
                    }
                    let backoff_ms = calculate_backoff(&self.policy, transient_failures);
                    tracing::warn!(
                        request_id = %request_id,
                        model = %pair.model,
                        attempt = transient_failures,
                        max_retries = self.policy.max_retries(),
                        backoff_ms = backoff_ms,
                        error = %e,
                        "Transient failure, retrying same pair"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    last_error = Some(e);
                    last_pair = Some(pair);
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        model = %pair.model,
                        credential_index = pair.credential.0,
                        error_kind = e.kind(),
                        error = %e,
                        "Generation rejected"
                    );
                    self.metrics.record_generation(Outcome::Failed);
                    // Fatal for this request only; the next one reselects
                    self.selector.release(&pair).await;
                    return Err(PipelineError::Backend(e));
                }
            }
        }

        if let Some(pair) = last_pair {
            self.selector.release(&pair).await;
        }
        self.metrics.record_generation(Outcome::Failed);
        Err(match last_error {
            Some(last_error) => PipelineError::RetriesExhausted {
                attempts: bound,
                last_error,
            },
            None => PipelineError::Selector(SelectorError::AllCombinationsExhausted {
                credentials: self.selector.credential_count(),
                models: self.selector.candidates().await.len(),
            }),
        })
    }

    async fn exclude(&self, pair: &Pair, exclude: &mut ExclusionSet) {
        self.selector.release(pair).await;
        exclude.insert(pair.clone());
    }
}
