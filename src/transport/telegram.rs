//! Telegram Bot API client
//!
//! Long-polling client over `reqwest`. Every response is an envelope
//! `{ "ok": bool, "result": .., "description": .. }`; `ok = false` becomes
//! [`TransportError::Api`]. The bot token is part of every URL, so URLs are
//! stripped from `reqwest` errors before they are logged.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::{
    BotIdentity, ChatAction, ChatKind, ChatTransport, FileRef, IncomingMessage, Sender, Update,
};
use crate::config::TelegramConfig;
use crate::error::{AppError, AppResult, TransportError};

/// Longest text sent in one message; longer replies are split
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Headroom on top of the long-poll timeout for the HTTP request itself
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram client bound to one bot token
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    file_base: String,
    poll_timeout_seconds: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_seconds) + POLL_GRACE)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build Telegram HTTP client: {}", e)))?;
        let base = config.api_base_url.trim_end_matches('/');
        Ok(Self {
            http,
            api_base: format!("{}/bot{}", base, token),
            file_base: format!("{}/file/bot{}", base, token),
            poll_timeout_seconds: config.poll_timeout_seconds,
        })
    }

    /// Remove any webhook so long polling receives updates
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "deleteWebhook",
                &json!({ "drop_pending_updates": drop_pending_updates }),
            )
            .await?;
        tracing::info!(drop_pending_updates, "Telegram webhook removed");
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let url = format!("{}/{}", self.api_base, method);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| http_error(method, e))?;
        let envelope: Envelope<T> = response.json().await.map_err(|e| http_error(method, e))?;
        envelope.into_result(method)
    }

    async fn file_bytes(&self, file: &FileRef) -> Result<Vec<u8>, TransportError> {
        let info: TgFile = self
            .call("getFile", &json!({ "file_id": file.file_id }))
            .await?;
        let path = info.file_path.ok_or_else(|| TransportError::Api {
            method: "getFile".to_string(),
            description: "file has no download path".to_string(),
        })?;

        let url = format!("{}/{}", self.file_base, path);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| http_error("downloadFile", e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| http_error("downloadFile", e))?;
        Ok(bytes.to_vec())
    }
}

fn http_error(method: &str, error: reqwest::Error) -> TransportError {
    TransportError::Http {
        method: method.to_string(),
        source: error.without_url(),
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn me(&self) -> Result<BotIdentity, TransportError> {
        let user: TgUser = self.call("getMe", &json!({})).await?;
        Ok(BotIdentity {
            id: user.id,
            username: user.username.unwrap_or_default(),
        })
    }

    async fn poll(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        let updates: Vec<TgUpdate> = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": self.poll_timeout_seconds,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;
        Ok(updates.into_iter().map(Update::from).collect())
    }

    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<(), TransportError> {
        for (index, chunk) in split_message(text, MAX_MESSAGE_CHARS).into_iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if let (0, Some(reply_to)) = (index, reply_to) {
                body["reply_to_message_id"] = json!(reply_to);
                body["allow_sending_without_reply"] = json!(true);
            }
            let _: serde_json::Value = self.call("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn send_action(&self, chat_id: i64, action: ChatAction) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "sendChatAction",
                &json!({ "chat_id": chat_id, "action": action.as_str() }),
            )
            .await?;
        Ok(())
    }

    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>, TransportError> {
        self.file_bytes(file).await
    }

    async fn download(&self, file: &FileRef, dest: &Path) -> Result<u64, TransportError> {
        let bytes = self.file_bytes(file).await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| TransportError::Io {
                path: dest.display().to_string(),
                source: e,
            })?;
        tracing::debug!(
            file_id = %file.file_id,
            bytes = bytes.len(),
            "Downloaded file"
        );
        Ok(bytes.len() as u64)
    }
}

/// Split `text` into chunks of at most `max_chars` characters
///
/// Prefers breaking after the last newline inside a chunk. Never splits a
/// UTF-8 character.
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = match rest[..limit].rfind('\n') {
            Some(newline) if newline > 0 => newline + 1,
            _ => limit,
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

// ── Telegram API types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self, method: &str) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::Api {
                method: method.to_string(),
                description: "response has no result".to_string(),
            }),
            (false, _) => Err(TransportError::Api {
                method: method.to_string(),
                description: self
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    #[serde(default)]
    photo: Vec<TgPhotoSize>,
    voice: Option<TgVoice>,
    reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    username: Option<String>,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    kind: ChatKind,
}

#[derive(Debug, Deserialize)]
struct TgPhotoSize {
    file_id: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgVoice {
    file_id: String,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

impl From<TgUpdate> for Update {
    fn from(update: TgUpdate) -> Self {
        Update {
            update_id: update.update_id,
            message: update.message.map(IncomingMessage::from),
        }
    }
}

impl From<TgMessage> for IncomingMessage {
    fn from(message: TgMessage) -> Self {
        let photo = message
            .photo
            .into_iter()
            .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
            .map(|size| FileRef {
                file_id: size.file_id,
                file_size: size.file_size,
            });
        IncomingMessage {
            chat_id: message.chat.id,
            message_id: message.message_id,
            chat_kind: message.chat.kind,
            sender: message.from.map(|user| Sender {
                id: user.id,
                username: user.username,
                first_name: user.first_name,
            }),
            text: message.text,
            caption: message.caption,
            photo,
            voice: message.voice.map(|voice| FileRef {
                file_id: voice.file_id,
                file_size: voice.file_size,
            }),
            reply_to_sender_id: message
                .reply_to_message
                .and_then(|reply| reply.from)
                .map(|user| user.id),
        }
    }
}
