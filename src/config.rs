//! Configuration management for relaygram
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Secrets (backend credentials, bot token, self-ping URL) are never read from
//! the file; they come from environment variables named in `[secrets]`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Upper bound for every timeout in the file, in seconds
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub personas: PersonasConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Health server configuration and the per-call backend timeout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Timeout applied to every probe and generation call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    60
}

/// Generative backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    /// Query the catalog endpoint at startup and merge it with `fallback_models`
    #[serde(default = "default_true")]
    pub discover_models: bool,
    /// Static model list used when the catalog is incomplete or unreachable
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    /// Prompt sent by probe requests
    #[serde(default = "default_probe_prompt")]
    pub probe_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            discover_models: true,
            fallback_models: default_fallback_models(),
            probe_prompt: default_probe_prompt(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_backend_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_true() -> bool {
    true
}

/// Fallback model list, revision 2025-06
///
/// Keep in sync with the `fallback_models` entry of the config template.
pub fn default_fallback_models() -> Vec<String> {
    [
        "gemini-2.0-flash-lite",
        "gemini-2.0-flash",
        "gemini-2.5-flash-lite",
        "gemini-2.5-flash",
        "gemini-flash-latest",
        "gemini-1.5-flash",
        "gemini-1.5-flash-8b",
        "gemini-2.5-pro",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_probe_prompt() -> String {
    "ping".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    8192
}

/// Retry policy for transient backend failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Immediate retries of the same pair after a transient failure
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: usize,
    /// Base backoff in milliseconds (doubles each retry)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: default_max_transient_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_max_transient_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

/// Per-chat conversation memory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationConfig {
    /// Number of user/reply exchanges kept per chat (oldest evicted)
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
        }
    }
}

fn default_history_turns() -> usize {
    10
}

/// Instruction strings and the keyword rules that select them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonasConfig {
    /// Instruction used when no rule matches
    #[serde(default = "default_instruction")]
    pub default: String,
    /// Ordered rules; the first rule with a matching keyword wins
    #[serde(default)]
    pub rules: Vec<PersonaRuleConfig>,
}

impl Default for PersonasConfig {
    fn default() -> Self {
        Self {
            default: default_instruction(),
            rules: Vec::new(),
        }
    }
}

fn default_instruction() -> String {
    "You are a helpful assistant in a Telegram chat. You can listen to voice \
     messages and look at photos. Answer briefly, to the point and with humor. \
     Reply in the language of the user."
        .to_string()
}

/// A keyword set mapped to an alternate instruction
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonaRuleConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub instruction: String,
}

/// Telegram Bot API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_url")]
    pub api_base_url: String,
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Updates of one poll batch handled concurrently
    #[serde(default = "default_max_concurrent_updates")]
    pub max_concurrent_updates: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_telegram_url(),
            poll_timeout_seconds: default_poll_timeout(),
            max_concurrent_updates: default_max_concurrent_updates(),
        }
    }
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_max_concurrent_updates() -> usize {
    8
}

/// Self-ping configuration for hosts that idle inactive services
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeepaliveConfig {
    #[serde(default = "default_keepalive_interval")]
    pub interval_seconds: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_keepalive_interval(),
        }
    }
}

fn default_keepalive_interval() -> u64 {
    300
}

/// Names of the environment variables holding secrets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecretsConfig {
    /// Comma-separated, ordered list of backend API keys
    #[serde(default = "default_credentials_env")]
    pub credentials_env: String,
    /// Single-key variable, used when `credentials_env` is unset
    #[serde(default = "default_single_credential_env")]
    pub single_credential_env: String,
    #[serde(default = "default_telegram_token_env")]
    pub telegram_token_env: String,
    #[serde(default = "default_external_url_env")]
    pub external_url_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            credentials_env: default_credentials_env(),
            single_credential_env: default_single_credential_env(),
            telegram_token_env: default_telegram_token_env(),
            external_url_env: default_external_url_env(),
        }
    }
}

fn default_credentials_env() -> String {
    "GEMINI_API_KEYS".to_string()
}

fn default_single_credential_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_telegram_token_env() -> String {
    "TELEGRAM_TOKEN".to_string()
}

fn default_external_url_env() -> String {
    "EXTERNAL_URL".to_string()
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Secrets resolved from the environment
#[derive(Clone)]
pub struct Secrets {
    /// Backend credentials in priority order; may be empty
    pub credentials: Vec<String>,
    pub telegram_token: String,
    pub external_url: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("credentials", &format_args!("[{} redacted]", self.credentials.len()))
            .field("telegram_token", &"<redacted>")
            .field("external_url", &self.external_url)
            .finish()
    }
}

impl Secrets {
    /// Read secrets from the process environment
    pub fn from_env(names: &SecretsConfig) -> AppResult<Self> {
        Self::from_lookup(names, |name| std::env::var(name).ok())
    }

    /// Read secrets through an arbitrary lookup function
    ///
    /// Blank values count as unset. An empty credential list is accepted here;
    /// the selector reports `NoCredentialsConfigured` on first use.
    pub fn from_lookup<F>(names: &SecretsConfig, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let credentials = match non_blank(&names.credentials_env) {
            Some(list) => parse_credential_list(&list),
            None => non_blank(&names.single_credential_env)
                .map(|key| vec![key.trim().to_string()])
                .unwrap_or_default(),
        };

        let telegram_token =
            non_blank(&names.telegram_token_env).ok_or_else(|| AppError::MissingSecret {
                name: names.telegram_token_env.clone(),
            })?;

        let external_url = non_blank(&names.external_url_env)
            .map(|url| url.trim().trim_end_matches('/').to_string());

        Ok(Self {
            credentials,
            telegram_token: telegram_token.trim().to_string(),
            external_url,
        })
    }
}

/// Split a comma-separated credential list, dropping blanks and duplicates
fn parse_credential_list(raw: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keys.iter().any(|existing| existing == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Per-call timeout for probes and generation requests
    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validate configuration after parsing
    ///
    /// Called automatically by `from_file()` and `from_str()`.
    pub fn validate(&self) -> AppResult<()> {
        validate_timeout(
            "server.request_timeout_seconds",
            self.server.request_timeout_seconds,
        )?;
        validate_timeout(
            "telegram.poll_timeout_seconds",
            self.telegram.poll_timeout_seconds,
        )?;

        for (field, url) in [
            ("backend.base_url", &self.backend.base_url),
            ("telegram.api_base_url", &self.telegram.api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{} must start with 'http://' or 'https://', got '{}'",
                    field, url
                )));
            }
        }

        if !self.backend.discover_models && self.backend.fallback_models.is_empty() {
            return Err(AppError::Config(
                "backend.fallback_models is empty and backend.discover_models is false: \
                no candidate models would ever be tried"
                    .to_string(),
            ));
        }

        if self
            .backend
            .fallback_models
            .iter()
            .any(|m| m.trim().is_empty())
        {
            return Err(AppError::Config(
                "backend.fallback_models contains a blank model name".to_string(),
            ));
        }

        if self.backend.probe_prompt.trim().is_empty() {
            return Err(AppError::Config(
                "backend.probe_prompt must not be blank".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.backend.temperature) || self.backend.temperature.is_nan() {
            return Err(AppError::Config(format!(
                "backend.temperature must be between 0.0 and 2.0, got {}",
                self.backend.temperature
            )));
        }

        if self.retry.max_transient_retries == 0 {
            return Err(AppError::Config(
                "retry.max_transient_retries must be at least 1".to_string(),
            ));
        }

        if self.conversation.history_turns == 0 {
            return Err(AppError::Config(
                "conversation.history_turns must be at least 1".to_string(),
            ));
        }

        if self.telegram.max_concurrent_updates == 0 {
            return Err(AppError::Config(
                "telegram.max_concurrent_updates must be at least 1".to_string(),
            ));
        }

        if self.keepalive.interval_seconds == 0 {
            return Err(AppError::Config(
                "keepalive.interval_seconds must be greater than 0".to_string(),
            ));
        }

        for rule in &self.personas.rules {
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(AppError::Config(format!(
                    "persona rule '{}' has no keywords",
                    rule.name
                )));
            }
            if rule.instruction.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "persona rule '{}' has a blank instruction",
                    rule.name
                )));
            }
        }

        Ok(())
    }
}

fn validate_timeout(field: &str, seconds: u64) -> AppResult<()> {
    if seconds == 0 {
        return Err(AppError::Config(format!(
            "{} must be greater than 0",
            field
        )));
    }
    if seconds > MAX_TIMEOUT_SECONDS {
        return Err(AppError::Config(format!(
            "{} cannot exceed {} seconds, got {}",
            field, MAX_TIMEOUT_SECONDS, seconds
        )));
    }
    Ok(())
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
