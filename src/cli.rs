//! Command-line interface for relaygram
//!
//! Provides argument parsing and subcommand handling for the relaygram binary.

use clap::{Parser, Subcommand};

/// Telegram bot relaying chat messages to a hosted generative-language API
#[derive(Parser)]
#[command(name = "relaygram")]
#[command(version)]
#[command(about = "Telegram bot relaying text, photos and voice notes to a hosted LLM")]
#[command(
    long_about = "relaygram answers Telegram messages with a hosted generative model. It \
    probes model/credential combinations, fails over on quota exhaustion, and serves a \
    small health surface for the hosting platform."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# relaygram Configuration
# ========================
#
# Secrets are NOT read from this file. Set them in the environment:
#
#   GEMINI_API_KEYS   comma-separated backend API keys, tried in order
#   GOOGLE_API_KEY    single key, used when GEMINI_API_KEYS is unset
#   TELEGRAM_TOKEN    bot token from @BotFather
#   EXTERNAL_URL      optional public URL of this service (enables self-ping)

# ─────────────────────────────────────────────────────────────────────────────
# HEALTH SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port for GET /, /health and /metrics
port = 8080

# Timeout for every backend call, probes included (1-300)
request_timeout_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# GENERATIVE BACKEND
# ─────────────────────────────────────────────────────────────────────────────

[backend]
base_url = "https://generativelanguage.googleapis.com/v1beta"

# Fetch the model catalog at startup and merge it with fallback_models
discover_models = true

# Static fallback list (revision 2025-06). Order does not matter: candidates
# are ranked by keyword score (lite/flash first, pro last).
fallback_models = [
    "gemini-2.0-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.5-flash",
    "gemini-flash-latest",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
    "gemini-2.5-pro",
]

# Prompt sent when probing whether a model/key combination works
probe_prompt = "ping"

temperature = 0.7
max_output_tokens = 8192

# ─────────────────────────────────────────────────────────────────────────────
# RETRIES
# ─────────────────────────────────────────────────────────────────────────────

[retry]
# Repeats of the same model/key after a transient failure (5xx, timeout)
max_transient_retries = 3

# Base backoff in milliseconds, doubled each retry, capped at 30 s
retry_backoff_ms = 2000

# ─────────────────────────────────────────────────────────────────────────────
# CONVERSATION
# ─────────────────────────────────────────────────────────────────────────────

[conversation]
# Exchanges remembered per chat (in memory only, lost on restart)
history_turns = 10

# ─────────────────────────────────────────────────────────────────────────────
# PERSONAS
# ─────────────────────────────────────────────────────────────────────────────

[personas]
default = "You are a helpful assistant in a Telegram chat. Answer briefly, to the point and with humor. Reply in the language of the user."

# Rules are checked in order; the first rule with a keyword in the message wins.
# Keywords match case-insensitively anywhere in the text.
[[personas.rules]]
name = "rude"
keywords = ["stupid", "shut up", "idiot"]
instruction = "The user is being rude. Answer with the same level of sharpness, stay witty, never use slurs."

# ─────────────────────────────────────────────────────────────────────────────
# TELEGRAM
# ─────────────────────────────────────────────────────────────────────────────

[telegram]
api_base_url = "https://api.telegram.org"

# Long-poll timeout for getUpdates (1-300)
poll_timeout_seconds = 30

# Updates of one batch handled concurrently
max_concurrent_updates = 8

# ─────────────────────────────────────────────────────────────────────────────
# KEEP-ALIVE
# ─────────────────────────────────────────────────────────────────────────────

[keepalive]
# Self-ping interval; only active when EXTERNAL_URL is set
interval_seconds = 300

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"
"#
}
