//! Scripted in-memory backend
//!
//! Deterministic backend double whose behaviour is scripted per
//! (model, credential) pair. Used by tests and benchmarks; never makes network
//! calls. Every `generate` call is recorded in order.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{GenerateRequest, GenerativeBackend};
use crate::error::BackendError;
use crate::models::{Credential, ModelId};

/// Scripted outcome of one `generate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    Reply(String),
    /// Success with no text
    Empty,
    Quota,
    NotFound,
    Transient,
    Rejected,
    /// Never completes; exercises caller timeouts
    Hang,
}

impl Behavior {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply(text.into())
    }
}

type PairKey = (String, String);

#[derive(Debug, Default)]
struct Script {
    sticky: HashMap<PairKey, Behavior>,
    queued: HashMap<PairKey, VecDeque<Behavior>>,
    calls: Vec<(ModelId, String)>,
    requests: Vec<GenerateRequest>,
    catalog_calls: usize,
}

/// Backend double driven by per-pair scripts
#[derive(Debug)]
pub struct ScriptedBackend {
    default: Behavior,
    catalog: Option<Vec<ModelId>>,
    script: Mutex<Script>,
}

impl ScriptedBackend {
    /// Create a backend answering every unscripted pair with `default`
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            catalog: Some(Vec::new()),
            script: Mutex::new(Script::default()),
        }
    }

    /// Models returned by `list_models`
    pub fn with_catalog<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.catalog = Some(models.into_iter().map(ModelId::new).collect());
        self
    }

    /// Make `list_models` fail with a transient error
    pub fn with_catalog_failure(mut self) -> Self {
        self.catalog = None;
        self
    }

    /// Script the sticky behaviour of one pair
    pub fn with(self, model: &str, credential: &str, behavior: Behavior) -> Self {
        self.set(model, credential, behavior);
        self
    }

    /// Change the sticky behaviour of one pair at runtime
    pub fn set(&self, model: &str, credential: &str, behavior: Behavior) {
        self.lock()
            .sticky
            .insert(key(model, credential), behavior);
    }

    /// Queue a one-shot behaviour consumed before the sticky one
    pub fn push_once(&self, model: &str, credential: &str, behavior: Behavior) {
        self.lock()
            .queued
            .entry(key(model, credential))
            .or_default()
            .push_back(behavior);
    }

    /// Every `generate` call so far, as (model, credential secret)
    pub fn calls(&self) -> Vec<(ModelId, String)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of `generate` calls made with one pair
    pub fn calls_for(&self, model: &str, credential: &str) -> usize {
        let model = ModelId::new(model);
        self.lock()
            .calls
            .iter()
            .filter(|(m, c)| *m == model && c == credential)
            .count()
    }

    pub fn catalog_calls(&self) -> usize {
        self.lock().catalog_calls
    }

    /// The most recent request passed to `generate`
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.lock().requests.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_behavior(&self, model: &ModelId, credential: &Credential, request: &GenerateRequest) -> Behavior {
        let mut script = self.lock();
        let pair = key(model.as_str(), credential.expose());
        script
            .calls
            .push((model.clone(), credential.expose().to_string()));
        script.requests.push(request.clone());

        if let Some(queued) = script.queued.get_mut(&pair).and_then(VecDeque::pop_front) {
            return queued;
        }
        script
            .sticky
            .get(&pair)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

fn key(model: &str, credential: &str) -> PairKey {
    (ModelId::new(model).as_str().to_string(), credential.to_string())
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn list_models(&self, _credential: &Credential) -> Result<Vec<ModelId>, BackendError> {
        self.lock().catalog_calls += 1;
        self.catalog.clone().ok_or_else(|| BackendError::Transient {
            reason: "scripted catalog failure".to_string(),
        })
    }

    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerateRequest,
    ) -> Result<String, BackendError> {
        match self.next_behavior(model, credential, request) {
            Behavior::Reply(text) => Ok(text),
            Behavior::Empty => Ok(String::new()),
            Behavior::Quota => Err(BackendError::QuotaExceeded {
                model: model.to_string(),
                message: "scripted quota exhaustion".to_string(),
            }),
            Behavior::NotFound => Err(BackendError::ModelUnavailable {
                model: model.to_string(),
                message: "scripted model not found".to_string(),
            }),
            Behavior::Transient => Err(BackendError::Transient {
                reason: "scripted transient failure".to_string(),
            }),
            Behavior::Rejected => Err(BackendError::Rejected {
                status: 400,
                message: "scripted rejection".to_string(),
            }),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_pair_uses_default() {
        let backend = ScriptedBackend::new(Behavior::Quota);
        let err = backend
            .generate(
                &ModelId::new("m"),
                &Credential::new("k"),
                &GenerateRequest::probe("ping"),
            )
            .await
            .expect_err("default is quota");
        assert!(err.is_quota());
        assert_eq!(backend.calls_for("m", "k"), 1);
    }

    #[tokio::test]
    async fn test_queued_behavior_runs_before_sticky() {
        let backend = ScriptedBackend::new(Behavior::NotFound).with("m", "k", Behavior::reply("ok"));
        backend.push_once("m", "k", Behavior::Transient);

        let request = GenerateRequest::probe("ping");
        let model = ModelId::new("m");
        let credential = Credential::new("k");
        assert!(backend.generate(&model, &credential, &request).await.is_err());
        assert_eq!(
            backend.generate(&model, &credential, &request).await.as_deref(),
            Ok("ok")
        );
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_catalog_failure() {
        let backend = ScriptedBackend::new(Behavior::Empty).with_catalog_failure();
        assert!(backend.list_models(&Credential::new("k")).await.is_err());
        assert_eq!(backend.catalog_calls(), 1);
    }
}
