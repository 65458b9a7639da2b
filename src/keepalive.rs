//! Self-ping loop
//!
//! Some hosts idle services without inbound traffic. When an external URL is
//! configured, the process requests its own `/health` endpoint on a fixed
//! interval. Failures are logged and otherwise ignored.

use std::time::Duration;

/// Health URL for an external base URL
pub fn health_url(external_url: &str) -> String {
    format!("{}/health", external_url.trim_end_matches('/'))
}

/// Ping `{external_url}/health` once, returning the HTTP status
pub async fn ping(http: &reqwest::Client, external_url: &str) -> Result<u16, reqwest::Error> {
    let response = http.get(health_url(external_url)).send().await?;
    Ok(response.status().as_u16())
}

/// Ping forever every `interval`
pub async fn run(external_url: String, interval: Duration) {
    let http = match reqwest::Client::builder().timeout(Duration::from_secs(30)).build() {
        Ok(http) => http,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build keep-alive HTTP client, keep-alive disabled");
            return;
        }
    };

    tracing::info!(
        url = %health_url(&external_url),
        interval_seconds = interval.as_secs(),
        "Starting keep-alive"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so the server is up first
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match ping(&http, &external_url).await {
            Ok(status) => tracing::debug!(status, "Keep-alive ping"),
            Err(e) => tracing::warn!(error = %e, "Keep-alive ping failed"),
        }
    }
}
