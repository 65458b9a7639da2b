//! Gemini REST backend
//!
//! Talks to the `generativelanguage` v1beta API with `reqwest`. The API key goes
//! in the `x-goog-api-key` header so it never appears in URLs, and therefore never
//! in `reqwest::Error` messages or logs.
//!
//! HTTP failures are classified here, once:
//! - 429 / `RESOURCE_EXHAUSTED` → [`BackendError::QuotaExceeded`]
//! - 404 / `NOT_FOUND`, or a 400 saying the model is unsupported → [`BackendError::ModelUnavailable`]
//! - 408, 5xx, connection and body read errors → [`BackendError::Transient`]
//! - any other status → [`BackendError::Rejected`]

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{ContentPart, GenerateRequest, GenerativeBackend};
use crate::config::BackendConfig;
use crate::error::{AppError, AppResult, BackendError};
use crate::models::{Credential, ModelId};

const API_KEY_HEADER: &str = "x-goog-api-key";
/// Longest backend error message kept in a `BackendError`
const MAX_ERROR_MESSAGE_CHARS: usize = 500;
/// Safety cap on catalog pagination
const MAX_CATALOG_PAGES: usize = 10;

/// HTTP client for a Gemini-compatible generative API
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("relaygram/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn generate_url(&self, model: &ModelId) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn build_body(&self, request: &GenerateRequest) -> GenerateContentBody {
        let parts = request.parts.iter().map(WirePart::from).collect();
        GenerateContentBody {
            system_instruction: request.instruction.as_ref().map(|text| WireContent {
                role: None,
                parts: vec![WirePart::Text { text: text.clone() }],
            }),
            contents: vec![WireContent {
                role: Some("user"),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn list_models(&self, credential: &Credential) -> Result<Vec<ModelId>, BackendError> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_CATALOG_PAGES {
            let mut query: Vec<(&str, String)> = vec![("pageSize", "1000".to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .header(API_KEY_HEADER, credential.expose())
                .query(&query)
                .send()
                .await
                .map_err(transport_failure)?;

            let status = response.status();
            let body = response.text().await.map_err(transport_failure)?;
            if !status.is_success() {
                return Err(classify_failure("catalog", status, &body));
            }

            let page: ListModelsResponse =
                serde_json::from_str(&body).map_err(|e| BackendError::Malformed {
                    reason: format!("catalog listing: {}", e),
                })?;

            models.extend(
                page.models
                    .into_iter()
                    .filter(|m| {
                        m.supported_generation_methods
                            .iter()
                            .any(|method| method == "generateContent")
                    })
                    .map(|m| ModelId::new(m.name)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(models = models.len(), "Fetched model catalog");
        Ok(models)
    }

    async fn generate(
        &self,
        model: &ModelId,
        credential: &Credential,
        request: &GenerateRequest,
    ) -> Result<String, BackendError> {
        let body = self.build_body(request);

        let response = self
            .http
            .post(self.generate_url(model))
            .header(API_KEY_HEADER, credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_failure)?;
        if !status.is_success() {
            return Err(classify_failure(model.as_str(), status, &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| BackendError::Malformed {
                reason: format!("generateContent response: {}", e),
            })?;

        let reply = parsed.reply_text();
        if reply.is_empty() {
            tracing::debug!(
                model = %model,
                candidates = parsed.candidates.len(),
                "Backend returned no text"
            );
        }
        Ok(reply)
    }
}

fn transport_failure(error: reqwest::Error) -> BackendError {
    BackendError::Transient {
        reason: error.to_string(),
    }
}

/// Map a non-success HTTP response to a classified error
pub fn classify_failure(model: &str, status: StatusCode, body: &str) -> BackendError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let api_status = envelope.as_ref().and_then(|e| e.status.as_deref());
    let message: String = envelope
        .as_ref()
        .and_then(|e| e.message.as_deref())
        .unwrap_or(body)
        .chars()
        .take(MAX_ERROR_MESSAGE_CHARS)
        .collect();

    if status == StatusCode::TOO_MANY_REQUESTS || api_status == Some("RESOURCE_EXHAUSTED") {
        return BackendError::QuotaExceeded {
            model: model.to_string(),
            message,
        };
    }

    let lowered = message.to_lowercase();
    if status == StatusCode::NOT_FOUND
        || api_status == Some("NOT_FOUND")
        || (status == StatusCode::BAD_REQUEST
            && (lowered.contains("not supported") || lowered.contains("not found")))
    {
        return BackendError::ModelUnavailable {
            model: model.to_string(),
            message,
        };
    }

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return BackendError::Transient {
            reason: format!("HTTP {}: {}", status.as_u16(), message),
        };
    }

    BackendError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

impl From<&ContentPart> for WirePart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => WirePart::Text { text: text.clone() },
            ContentPart::Image { mime_type, data } | ContentPart::Audio { mime_type, data } => {
                WirePart::Inline {
                    inline_data: InlineData {
                        mime_type: mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(data),
                    },
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn reply_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
    #[serde(default, rename = "supportedGenerationMethods")]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}
