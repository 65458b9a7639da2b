//! relaygram bot process
//!
//! Loads configuration and secrets, selects an initial model/credential pair,
//! then runs the health server, the keep-alive loop and Telegram long polling
//! until Ctrl-C.

use clap::Parser;
use relaygram::backend::GeminiBackend;
use relaygram::bot::{self, MessageHandler};
use relaygram::cli::{Cli, Command, generate_config_template};
use relaygram::config::{Config, Secrets};
use relaygram::error::AppError;
use relaygram::handlers::{self, AppState};
use relaygram::metrics::Metrics;
use relaygram::models::{Credential, ExclusionSet, ModelSelector, SelectorSettings};
use relaygram::pipeline::{ConversationHistory, PersonaRules, Pipeline, RetryPolicy};
use relaygram::transport::{ChatTransport, TelegramClient};
use relaygram::{keepalive, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Config::from_file(&cli.config)?;
    telemetry::init(&config.observability.log_level);

    let secrets = Secrets::from_env(&config.secrets)?;
    tracing::info!(
        credentials = secrets.credentials.len(),
        keepalive = secrets.external_url.is_some(),
        "Loaded secrets from environment"
    );

    let metrics = Arc::new(Metrics::new()?);
    let backend = Arc::new(GeminiBackend::new(&config.backend)?);
    let credentials: Vec<Credential> = secrets
        .credentials
        .iter()
        .map(|key| Credential::new(key.as_str()))
        .collect();
    let selector = Arc::new(ModelSelector::new(
        backend,
        credentials,
        SelectorSettings::from_config(&config),
        metrics.clone(),
    ));

    let candidates = selector.discover().await;
    tracing::info!(candidates, "Candidate models ready");
    match selector.select(&ExclusionSet::new()).await {
        Ok(pair) => tracing::info!(pair = %pair, "Initial model/credential pair selected"),
        Err(e) => tracing::warn!(
            error = %e,
            "No working model/credential pair at startup; will retry on first message"
        ),
    }

    let policy = RetryPolicy::from_config(&config).map_err(|e| AppError::Config(e.to_string()))?;
    let pipeline = Arc::new(Pipeline::new(selector.clone(), policy, metrics.clone()));

    let telegram = Arc::new(TelegramClient::new(
        &config.telegram,
        &secrets.telegram_token,
    )?);
    telegram.delete_webhook(true).await?;
    let identity = telegram.me().await?;
    tracing::info!(bot = %identity.username, "Connected to Telegram");

    let handler = Arc::new(MessageHandler::new(
        telegram,
        pipeline,
        PersonaRules::from_config(&config.personas)?,
        ConversationHistory::new(config.conversation.history_turns),
        identity,
    ));

    let app = handlers::router(AppState::new(selector, metrics));
    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Health surface listening on {}", addr);

    let keepalive_interval = Duration::from_secs(config.keepalive.interval_seconds);
    let keepalive = async move {
        if let Some(url) = secrets.external_url {
            keepalive::run(url, keepalive_interval).await;
        }
        // Keep-alive stopping must not end the process
        std::future::pending::<()>().await
    };

    tokio::select! {
        result = async { axum::serve(listener, app).await } => {
            result?;
        }
        _ = keepalive => {}
        _ = bot::run_polling(handler, config.telegram.max_concurrent_updates) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
