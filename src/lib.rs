//! relaygram - Telegram bot relaying chat messages to a hosted generative model
//!
//! Text, photos and voice notes are forwarded to a Gemini-style REST API. A
//! model/credential selector probes ranked candidate models under each API key,
//! fails over when a combination runs out of quota, and keeps the pair that
//! answered until it fails.

pub mod backend;
pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keepalive;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod telemetry;
pub mod transport;
