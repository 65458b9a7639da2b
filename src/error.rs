//! Error types for relaygram
//!
//! Backend failures are classified once, where the HTTP response is read, into
//! typed variants. Retry and failover policy matches on those variants and never
//! inspects message text.
//!
//! `AppError` implements `IntoResponse` for the Axum health surface.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Classified failure of a generative backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Rate limit or quota hit for this (model, credential) pair
    ///
    /// Recoverable: the pair is marked exhausted and another one is selected.
    #[error("Quota exceeded for model {model}: {message}")]
    QuotaExceeded { model: String, message: String },

    /// The model identifier is unknown or not usable with this credential
    ///
    /// Recoverable: another pair is selected without marking exhaustion.
    #[error("Model {model} is unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    /// Network or server-side failure that may succeed when repeated
    #[error("Transient backend failure: {reason}")]
    Transient { reason: String },

    /// No response within the configured per-call timeout
    #[error("Backend call timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Any other client error reported by the backend
    #[error("Backend rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend answered with a body that could not be decoded
    #[error("Backend returned a malformed response: {reason}")]
    Malformed { reason: String },
}

impl BackendError {
    /// Quota/rate-limit signal: exhaust the pair and reselect
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Not-found/unsupported signal: reselect without exhausting the pair
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }

    /// Transient failure: repeat the call after a short backoff
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } | Self::Timeout { .. } => true,
            Self::QuotaExceeded { .. }
            | Self::ModelUnavailable { .. }
            | Self::Rejected { .. }
            | Self::Malformed { .. } => false,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::Transient { .. } => "transient",
            Self::Timeout { .. } => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Failure of the model/credential selection algorithm
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("No backend credentials configured")]
    NoCredentialsConfigured,

    #[error(
        "Every model/credential combination is exhausted or unavailable \
         ({credentials} credentials, {models} models)"
    )]
    AllCombinationsExhausted { credentials: usize, models: usize },

    #[error("Backend unavailable during selection: {reason}")]
    BackendUnavailable { reason: String },
}

/// Failure of one user-visible generation request
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Request contained no usable content")]
    EmptyInput,

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Generation failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Gave up after {attempts} attempts, last error: {last_error}")]
    RetriesExhausted {
        attempts: usize,
        last_error: BackendError,
    },

    #[error("Failed to prepare media: {0}")]
    Media(String),
}

/// Reply sent when the backend cannot answer
pub const UNAVAILABLE_MESSAGE: &str =
    "The assistant is unavailable right now. Please try again later.";

impl PipelineError {
    /// The single sentence shown to the chat user
    ///
    /// Backend details are never included; they go to the logs only.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "Empty message.",
            Self::Media(_) => "Could not read the attachment.",
            Self::Selector(_) | Self::Backend(_) | Self::RetriesExhausted { .. } => {
                UNAVAILABLE_MESSAGE
            }
        }
    }
}

/// Failure talking to the chat transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Telegram API call {method} failed: {description}")]
    Api { method: String, description: String },

    #[error("HTTP error calling {method}: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Environment variable {name} is not set")]
    MissingSecret { name: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::MissingSecret { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::Transport(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
