//! Priority scoring for candidate models
//!
//! A pure function of the identifier string: every keyword of the weighted table
//! that occurs in the lowercased identifier adds its weight. The score only
//! decides which model is probed first.

use super::pair::ModelId;

/// Keyword weights, matched as substrings of the lowercased identifier
///
/// Experimental and preview tiers tend to carry generous free quotas; lightweight
/// tiers are cheap; "pro"/"ultra" tiers are quota-constrained. Non-chat model
/// families sink to the bottom.
pub const KEYWORD_WEIGHTS: &[(&str, i32)] = &[
    ("exp", 30),
    ("preview", 25),
    ("lite", 20),
    ("flash", 15),
    ("8b", 10),
    ("latest", 5),
    ("pro", -20),
    ("ultra", -30),
    ("tts", -60),
    ("image", -60),
    ("vision", -100),
    ("embedding", -100),
    ("aqa", -100),
];

/// Score a model identifier (higher = tried first)
pub fn priority_score(model: &ModelId) -> i32 {
    let name = model.as_str().to_lowercase();
    KEYWORD_WEIGHTS
        .iter()
        .filter(|(keyword, _)| name.contains(keyword))
        .map(|(_, weight)| weight)
        .sum()
}

/// Order candidates by score, highest first
///
/// The sort is stable: equal scores keep their discovery order.
pub fn rank(mut candidates: Vec<ModelId>) -> Vec<ModelId> {
    candidates.sort_by_key(|model| std::cmp::Reverse(priority_score(model)));
    candidates
}
