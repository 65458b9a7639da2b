//! Chat transport interface
//!
//! The bot talks to its chat platform through [`ChatTransport`], so message
//! handling can be exercised against an in-memory transport in tests.

pub mod telegram;

pub use telegram::TelegramClient;

use crate::error::TransportError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

/// Kind of chat a message arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_private(&self) -> bool {
        matches!(self, ChatKind::Private)
    }
}

/// Author of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// Handle used in prompts: username, else first name
    pub fn handle(&self) -> &str {
        match self.username.as_deref() {
            Some(username) if !username.is_empty() => username,
            _ if !self.first_name.is_empty() => &self.first_name,
            _ => "unknown",
        }
    }
}

/// Reference to a file stored by the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub file_id: String,
    pub file_size: Option<u64>,
}

/// A message addressed to (or overheard by) the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub chat_kind: ChatKind,
    pub sender: Option<Sender>,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Largest available size of an attached photo
    pub photo: Option<FileRef>,
    pub voice: Option<FileRef>,
    /// Author of the message this one replies to
    pub reply_to_sender_id: Option<i64>,
}

impl IncomingMessage {
    /// Text or caption, whichever is present
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

/// One polled update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

/// The bot's own account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

/// Status shown in the chat while a reply is prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

impl ChatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatAction::Typing => "typing",
        }
    }
}

/// Trait for chat transports
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Identity of the bot account
    async fn me(&self) -> Result<BotIdentity, TransportError>;

    /// Long-poll for updates with id `>= offset`
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, TransportError>;

    /// Send `text`, optionally as a reply to `reply_to`
    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), TransportError>;

    async fn send_action(&self, chat_id: i64, action: ChatAction) -> Result<(), TransportError>;

    /// Fetch a file into memory
    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>, TransportError>;

    /// Download a file to `dest`, returning the number of bytes written
    async fn download(&self, file: &FileRef, dest: &Path) -> Result<u64, TransportError>;
}
