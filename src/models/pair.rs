//! Type-safe identifiers for models, credential slots and their combinations
//!
//! A `Pair` is the unit the selector works with: one model identifier used with
//! one credential slot. Exhaustion and request-scoped exclusion are both keyed by
//! `Pair`.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Backend model identifier
///
/// Catalog listings return names such as `models/gemini-2.0-flash`; the
/// `models/` prefix is stripped so catalog and fallback entries compare equal.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(name: impl AsRef<str>) -> Self {
        let trimmed = name.as_ref().trim();
        let bare = trimmed.strip_prefix("models/").unwrap_or(trimmed);
        Self(bare.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ModelId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Position of a credential slot in the configured ordered list
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct CredentialIndex(pub usize);

impl fmt::Display for CredentialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque backend access token
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building backend requests only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// One (model, credential slot) combination
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct Pair {
    pub model: ModelId,
    pub credential: CredentialIndex,
}

impl Pair {
    pub fn new(model: impl Into<ModelId>, credential: CredentialIndex) -> Self {
        Self {
            model: model.into(),
            credential,
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@credential#{}", self.model, self.credential)
    }
}

/// Pairs skipped for the rest of one user request
pub type ExclusionSet = HashSet<Pair>;
