//! Prometheus metrics collection for relaygram
//!
//! Tracks:
//! - Probe requests by outcome
//! - Newly exhausted (model, credential) pairs
//! - Selection runs by outcome
//! - User-visible generation requests by outcome
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Outcome label for probes, selections and generations
///
/// Restricting labels to a closed enum keeps cardinality bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    QuotaExceeded,
    ModelUnavailable,
    Empty,
    Transient,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::QuotaExceeded => "quota_exceeded",
            Outcome::ModelUnavailable => "model_unavailable",
            Outcome::Empty => "empty",
            Outcome::Transient => "transient",
            Outcome::Failed => "failed",
        }
    }

    /// Outcome label for a classified backend error
    pub fn from_error(error: &crate::error::BackendError) -> Self {
        if error.is_quota() {
            Outcome::QuotaExceeded
        } else if error.is_model_unavailable() {
            Outcome::ModelUnavailable
        } else if error.is_transient() {
            Outcome::Transient
        } else {
            Outcome::Failed
        }
    }
}

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    probes_total: IntCounterVec,
    exhausted_pairs_total: IntCounter,
    selections_total: IntCounterVec,
    generations_total: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let probes_total = IntCounterVec::new(
            Opts::new(
                "relaygram_probes_total",
                "Probe requests sent while selecting a model/credential pair, by outcome",
            ),
            &["outcome"],
        )?;

        let exhausted_pairs_total = IntCounter::with_opts(Opts::new(
            "relaygram_exhausted_pairs_total",
            "Model/credential pairs marked exhausted after a quota failure",
        ))?;

        let selections_total = IntCounterVec::new(
            Opts::new(
                "relaygram_selections_total",
                "Runs of the selection algorithm, by outcome",
            ),
            &["outcome"],
        )?;

        let generations_total = IntCounterVec::new(
            Opts::new(
                "relaygram_generations_total",
                "User-visible generation requests, by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(exhausted_pairs_total.clone()))?;
        registry.register(Box::new(selections_total.clone()))?;
        registry.register(Box::new(generations_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            probes_total,
            exhausted_pairs_total,
            selections_total,
            generations_total,
        })
    }

    pub fn record_probe(&self, outcome: Outcome) {
        self.probes_total.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_exhausted_pair(&self) {
        self.exhausted_pairs_total.inc();
    }

    pub fn record_selection(&self, outcome: Outcome) {
        self.selections_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_generation(&self, outcome: Outcome) {
        self.generations_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn probe_count(&self, outcome: Outcome) -> u64 {
        self.probes_total.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn exhausted_pair_count(&self) -> u64 {
        self.exhausted_pairs_total.get()
    }

    pub fn generation_count(&self, outcome: Outcome) -> u64 {
        self.generations_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {}", e)))
    }
}
