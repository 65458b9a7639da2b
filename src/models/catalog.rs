//! Candidate list assembly
//!
//! Candidates are the union of the backend catalog and the static fallback list
//! from configuration, deduplicated and then ranked by priority score.

use super::pair::ModelId;
use super::scoring;

/// Fallback model identifiers from configuration
pub fn static_fallback(names: &[String]) -> Vec<ModelId> {
    names.iter().map(ModelId::new).collect()
}

/// Union of catalog and fallback, deduplicated, ranked
///
/// Catalog entries come first in discovery order, followed by fallback entries
/// the catalog did not report. Ranking is stable, so this order breaks ties.
pub fn merge_candidates(catalog: &[ModelId], fallback: &[ModelId]) -> Vec<ModelId> {
    let mut merged: Vec<ModelId> = Vec::with_capacity(catalog.len() + fallback.len());
    for model in catalog.iter().chain(fallback.iter()) {
        if model.as_str().is_empty() || merged.contains(model) {
            continue;
        }
        merged.push(model.clone());
    }
    scoring::rank(merged)
}
