//! Conversation state owned by a single orchestrator invocation.

use uuid::Uuid;
use vizier_ai::Message;

/// Ordered message history for one exchange.
///
/// Owned exclusively by one orchestrator invocation; messages are only ever
/// appended between turns, never rewritten.
#[derive(Debug)]
pub struct ConversationState {
    /// Exchange identifier, used for log correlation
    pub id: Uuid,
    /// Conversation messages
    pub messages: Vec<Message>,
}

impl ConversationState {
    /// Create an empty conversation
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    /// Create a conversation seeded with existing messages
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages,
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Concatenated text of every assistant message, in order.
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| matches!(m, Message::Assistant { .. }))
            .map(|m| m.text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
