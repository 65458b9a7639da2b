//! Message handling and the polling loop
//!
//! Decides whether a message is addressed to the bot, turns it into a
//! generation request (text, photo, voice), picks the persona, and sends back
//! either the reply or one fixed sentence describing the failure.

use aho_corasick::AhoCorasick;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::backend::{ContentPart, GenerateRequest};
use crate::error::{PipelineError, TransportError};
use crate::pipeline::prompt::{self, MEDIA_PLACEHOLDER};
use crate::pipeline::{ConversationHistory, Pipeline, PersonaRules, RequestId, ScratchFile};
use crate::transport::{BotIdentity, ChatAction, ChatTransport, IncomingMessage};

/// Delay before polling again after a transport error
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Text sent in place of an empty reply
pub const EMPTY_REPLY: &str = "...";

const PHOTO_MIME: &str = "image/jpeg";
const VOICE_MIME: &str = "audio/ogg";

/// Whether the bot should answer `message`
///
/// Private chats always; groups only when the message replies to the bot or
/// mentions its `@username` in text or caption.
pub fn is_addressed(message: &IncomingMessage, identity: &BotIdentity) -> bool {
    if message.chat_kind.is_private() {
        return true;
    }
    if message.reply_to_sender_id == Some(identity.id) {
        return true;
    }
    match (mention_matcher(&identity.username), message.body()) {
        (Some(matcher), Some(body)) => matcher.is_match(body),
        _ => false,
    }
}

/// Remove every `@username` mention, case-insensitively, and trim the ends
///
/// Inner whitespace is left alone so line breaks and indentation survive.
pub fn strip_mention(text: &str, username: &str) -> String {
    match mention_matcher(username) {
        Some(matcher) => matcher.replace_all(text, &[""]).trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Usernames are ASCII, so ASCII case folding matches on any surrounding text
fn mention_matcher(username: &str) -> Option<AhoCorasick> {
    if username.is_empty() {
        return None;
    }
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([format!("@{}", username)])
        .map_err(|e| tracing::warn!(error = %e, "Failed to build mention matcher"))
        .ok()
}

/// Handles single messages; shared by every concurrent update
pub struct MessageHandler {
    transport: Arc<dyn ChatTransport>,
    pipeline: Arc<Pipeline>,
    personas: PersonaRules,
    history: ConversationHistory,
    identity: BotIdentity,
}

impl MessageHandler {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        pipeline: Arc<Pipeline>,
        personas: PersonaRules,
        history: ConversationHistory,
        identity: BotIdentity,
    ) -> Self {
        Self {
            transport,
            pipeline,
            personas,
            history,
            identity,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Handle one incoming message
    ///
    /// Only transport failures are returned; generation failures are reported
    /// to the chat.
    pub async fn handle(&self, message: IncomingMessage) -> Result<(), TransportError> {
        if !is_addressed(&message, &self.identity) {
            tracing::trace!(chat_id = message.chat_id, "Ignoring message not addressed to bot");
            return Ok(());
        }

        let text = message
            .body()
            .map(|body| strip_mention(body, &self.identity.username))
            .unwrap_or_default();

        if is_start_command(&text) {
            let greeting = self.greeting().await;
            return self
                .transport
                .send_text(message.chat_id, Some(message.message_id), &greeting)
                .await;
        }

        let request_id = RequestId::new();
        let sender = message
            .sender
            .as_ref()
            .map(|s| s.handle().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::info!(
            request_id = %request_id,
            chat_id = message.chat_id,
            sender = %sender,
            has_photo = message.photo.is_some(),
            has_voice = message.voice.is_some(),
            text_length = text.len(),
            "Handling message"
        );

        if let Err(e) = self
            .transport
            .send_action(message.chat_id, ChatAction::Typing)
            .await
        {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to send typing indicator");
        }

        let reply = match self.respond(&message, &sender, &text, request_id).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    chat_id = message.chat_id,
                    error = %e,
                    "Failed to generate reply"
                );
                e.user_message().to_string()
            }
        };

        self.transport
            .send_text(message.chat_id, Some(message.message_id), &reply)
            .await
    }

    /// Build the request, generate, and record the exchange
    async fn respond(
        &self,
        message: &IncomingMessage,
        sender: &str,
        text: &str,
        request_id: RequestId,
    ) -> Result<String, PipelineError> {
        if text.trim().is_empty() && message.photo.is_none() && message.voice.is_none() {
            return Err(PipelineError::EmptyInput);
        }

        let history = self.history.render(message.chat_id).await;
        let mut parts = vec![ContentPart::text(prompt::assemble(
            sender,
            &history,
            text,
            message.voice.is_some(),
        ))];

        if let Some(photo) = &message.photo {
            let data = self
                .transport
                .fetch(photo)
                .await
                .map_err(|e| PipelineError::Media(e.to_string()))?;
            parts.push(ContentPart::Image {
                mime_type: PHOTO_MIME.to_string(),
                data,
            });
        }

        // Kept alive until generation finishes; removed on every return path
        let mut scratch: Option<ScratchFile> = None;
        if let Some(voice) = &message.voice {
            let file = scratch.insert(ScratchFile::new(".ogg")?);
            self.transport
                .download(voice, file.path())
                .await
                .map_err(|e| PipelineError::Media(e.to_string()))?;
            parts.push(ContentPart::Audio {
                mime_type: VOICE_MIME.to_string(),
                data: file.read_bytes().await?,
            });
        }

        let persona = self.personas.classify(text);
        tracing::debug!(request_id = %request_id, persona = %persona.name, "Persona selected");

        let request = GenerateRequest::new(Some(persona.instruction.clone()), parts);
        let reply = self.pipeline.generate(&request, request_id).await?;
        drop(scratch);

        let reply = if reply.trim().is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            reply
        };
        let user_text = if text.trim().is_empty() {
            MEDIA_PLACEHOLDER
        } else {
            text
        };
        self.history
            .record(message.chat_id, user_text, reply.clone())
            .await;
        Ok(reply)
    }

    async fn greeting(&self) -> String {
        match self.pipeline.selector().active().await {
            Some(pair) => format!("Hi! I'm online and running on {}.", pair.model),
            None => "Hi! I'm online and selecting a model right now.".to_string(),
        }
    }
}

fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    command == "/start" || command.starts_with("/start@")
}

/// Long-poll forever, handing every message to its own task
///
/// Polling never waits for replies; at most `max_concurrent` messages are
/// handled at once and the rest queue for a permit. The offset moves past
/// every received update, handled or not. Transport errors are logged and
/// polling resumes after [`POLL_RETRY_DELAY`].
pub async fn run_polling(handler: Arc<MessageHandler>, max_concurrent: usize) {
    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut offset: i64 = 0;

    tracing::info!(max_concurrent, "Starting long polling");
    loop {
        let updates = match handler.transport.poll(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retry_in_seconds = POLL_RETRY_DELAY.as_secs(),
                    "Polling failed, retrying"
                );
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            offset = last + 1;
        }

        for message in updates.into_iter().filter_map(|u| u.message) {
            let handler = Arc::clone(&handler);
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                // The semaphore is never closed
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let chat_id = message.chat_id;
                if let Err(e) = handler.handle(message).await {
                    tracing::warn!(chat_id, error = %e, "Failed to deliver reply");
                }
            });
        }
    }
}
