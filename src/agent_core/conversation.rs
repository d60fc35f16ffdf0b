//! ConversationContext: bounded in-memory conversation history.
//!
//! Responsibilities:
//! - Append messages in order, evicting the oldest once `max_history` is exceeded
//! - Produce the role/content view the LLM consumes (metadata stripped)
//! - Hold small per-conversation metadata for the embedding application
//!
//! Eviction is silent. Callers must not assume the full history survives a
//! long session.

use std::collections::VecDeque;

use serde_json::{Map, Value};

use super::types::Message;
use crate::inference::types::{ChatMessage, MessageContent, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default number of messages kept.
pub const DEFAULT_MAX_HISTORY: usize = 50;

// ─── ConversationContext ────────────────────────────────────────────────────

/// Ordered message log with a sliding-window bound.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: VecDeque<Message>,
    max_history: usize,
    metadata: Map<String, Value>,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationContext {
    /// Create an empty context. A `max_history` of 0 is treated as 1.
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            messages: VecDeque::with_capacity(max_history.min(DEFAULT_MAX_HISTORY) + 1),
            max_history,
            metadata: Map::new(),
        }
    }

    /// Append a message, dropping from the front while over the bound.
    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<MessageContent>,
        metadata: Option<Map<String, Value>>,
    ) {
        self.messages
            .push_back(Message::new(role, content, metadata.unwrap_or_default()));

        while self.messages.len() > self.max_history {
            self.messages.pop_front();
        }
    }

    /// Messages in order, as role/content pairs for the LLM.
    ///
    /// The iterator borrows the context; call again for a fresh pass.
    pub fn get_messages(&self) -> impl Iterator<Item = ChatMessage> + Clone + '_ {
        self.messages.iter().map(Message::to_chat_message)
    }

    /// The stored messages, metadata included.
    pub fn messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.back()
    }

    /// Drop all messages and context metadata.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.metadata.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
