//! Per-chat conversation history
//!
//! Keeps the most recent exchanges of each chat in memory so replies can refer
//! to earlier messages. Nothing is persisted; the buffer is lost on restart.

use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// One user message and the reply it received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub reply: String,
}

/// Bounded history buffers keyed by chat id
#[derive(Debug)]
pub struct ConversationHistory {
    capacity: usize,
    chats: Mutex<HashMap<i64, VecDeque<Turn>>>,
}

impl ConversationHistory {
    /// Create a history keeping at most `capacity` turns per chat
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Append a turn, evicting the oldest one when full
    pub async fn record(&self, chat_id: i64, user: impl Into<String>, reply: impl Into<String>) {
        let mut chats = self.chats.lock().await;
        let turns = chats
            .entry(chat_id)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        while turns.len() >= self.capacity {
            turns.pop_front();
        }
        turns.push_back(Turn {
            user: user.into(),
            reply: reply.into(),
        });
    }

    /// Turns of a chat, oldest first
    pub async fn turns(&self, chat_id: i64) -> Vec<Turn> {
        self.chats
            .lock()
            .await
            .get(&chat_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// History as `USER:`/`ASSISTANT:` lines, empty when there is none
    pub async fn render(&self, chat_id: i64) -> String {
        self.turns(chat_id)
            .await
            .iter()
            .map(|turn| format!("USER: {}\nASSISTANT: {}", turn.user, turn.reply))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
