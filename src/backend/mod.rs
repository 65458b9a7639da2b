//! Generative backend interface
//!
//! The backend is an external collaborator: it lists the models a credential can
//! use and generates text from a list of content parts. Every failure it reports
//! is already classified into a [`BackendError`] variant.

pub mod gemini;
pub mod scripted;

pub use gemini::GeminiBackend;
pub use scripted::{Behavior, ScriptedBackend};

use crate::error::BackendError;
use crate::models::{Credential, ModelId};
use async_trait::async_trait;

/// One piece of user content sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
    Audio { mime_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Whether the part carries nothing to send
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Image { data, .. } | Self::Audio { data, .. } => data.is_empty(),
        }
    }
}

/// A single generation call: optional instruction plus content parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
    pub instruction: Option<String>,
    pub parts: Vec<ContentPart>,
}

impl GenerateRequest {
    pub fn new(instruction: Option<String>, parts: Vec<ContentPart>) -> Self {
        Self { instruction, parts }
    }

    /// Minimal request used to test whether a pair currently works
    pub fn probe(prompt: &str) -> Self {
        Self {
            instruction: None,
            parts: vec![ContentPart::text(prompt)],
        }
    }
}

/// Trait for generative backends
///
/// Allows dependency injection of the HTTP backend, enabling tests with a
/// scripted backend that makes no network calls.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// List model identifiers usable for generation with this credential
    async fn list_models(&self, credential: &Credential) -> Result<Vec<ModelId>, BackendError>;

    /// Generate text for `request` with `model`, authenticated by `credential`
    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerateRequest,
    ) -> Result<String, BackendError>;
}
