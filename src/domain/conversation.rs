//! Conversation channels and their message logs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// One of the fixed flow channels the front-end exposes.
///
/// Every key must have an endpoint configured at startup; the wire name is
/// the lowercase form used in configuration and in the `session_metadata`
/// block sent upstream.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKey {
    #[display("chat")]
    Chat,
    #[display("research")]
    Research,
    #[display("documents")]
    Documents,
}

impl ConversationKey {
    pub const ALL: [ConversationKey; 3] = [
        ConversationKey::Chat,
        ConversationKey::Research,
        ConversationKey::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKey::Chat => "chat",
            ConversationKey::Research => "research",
            ConversationKey::Documents => "documents",
        }
    }
}

/// Author of a message within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only message log for one (session, conversation) pair.
///
/// Bounded: once `max_messages` is reached the oldest messages are dropped
/// so a long-lived session cannot grow without limit.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    messages: VecDeque<Message>,
    max_messages: usize,
}

impl ConversationLog {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(2),
        }
    }

    pub fn append(&mut self, role: MessageRole, content: String) {
        self.messages.push_back(Message {
            role,
            content,
            created_at: Utc::now(),
        });
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
