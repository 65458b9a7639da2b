//! Exhaustion tracking for (model, credential) pairs
//!
//! The table is append-only for the lifetime of the process: a pair marked
//! exhausted after a quota failure is never unmarked. Marking is idempotent.

use super::pair::{CredentialIndex, ModelId, Pair};
use std::collections::{BTreeSet, HashMap};

/// Exhaustion flags keyed by model, then credential slot
#[derive(Debug, Clone, Default)]
pub struct ExhaustionTable {
    by_model: HashMap<ModelId, BTreeSet<CredentialIndex>>,
    marked: usize,
}

impl ExhaustionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a pair exhausted
    ///
    /// Returns `true` when the flag was newly set, `false` if it already was.
    pub fn mark(&mut self, pair: &Pair) -> bool {
        let newly = self
            .by_model
            .entry(pair.model.clone())
            .or_default()
            .insert(pair.credential);
        if newly {
            self.marked += 1;
        }
        newly
    }

    pub fn is_exhausted(&self, pair: &Pair) -> bool {
        self.by_model
            .get(&pair.model)
            .is_some_and(|slots| slots.contains(&pair.credential))
    }

    /// Number of exhausted pairs
    pub fn len(&self) -> usize {
        self.marked
    }

    pub fn is_empty(&self) -> bool {
        self.marked == 0
    }

    /// Whether every combination of `models` and `credential_count` slots is exhausted
    pub fn covers(&self, models: &[ModelId], credential_count: usize) -> bool {
        if models.is_empty() || credential_count == 0 {
            return false;
        }
        models.iter().all(|model| {
            self.by_model
                .get(model)
                .is_some_and(|slots| (0..credential_count).all(|i| slots.contains(&CredentialIndex(i))))
        })
    }
}
