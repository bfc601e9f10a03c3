//! Assistant conversations.
//!
//! A conversation is an ordered list of role-tagged turns owned by one user.
//! Turns are only ever appended, in user/assistant pairs, by a successful
//! metered exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, UserId};

/// Maximum number of characters of the opening message used as a title.
pub const TITLE_MAX_CHARS: usize = 50;

/// A stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id.
    pub conversation_id: ConversationId,
    /// Owner.
    pub user_id: UserId,
    /// Title derived from the opening message.
    pub title: String,
    /// Turns in order.
    pub messages: Vec<ChatMessage>,
    /// Credits spent on this conversation.
    pub credits_used: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last appended exchange.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start an empty conversation titled after `opening_message`.
    #[must_use]
    pub fn start(conversation_id: ConversationId, user_id: UserId, opening_message: &str) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            user_id,
            title: title_from(opening_message),
            messages: Vec::new(),
            credits_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this conversation.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Append one paid exchange and count its credit.
    pub fn push_exchange(&mut self, user_message: &str, assistant_reply: &str) {
        let now = Utc::now();
        self.messages.push(ChatMessage {
            role: Role::User,
            content: user_message.to_string(),
            timestamp: now,
        });
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: assistant_reply.to_string(),
            timestamp: now,
        });
        self.credits_used += 1;
        self.updated_at = now;
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker.
    pub role: Role,
    /// Text.
    pub content: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction prepended to every prompt. Never stored.
    System,
    /// The end user.
    User,
    /// The AI model.
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Derive a title from the opening message.
///
/// Uses the first [`TITLE_MAX_CHARS`] characters and appends `...` only when
/// the message was longer.
#[must_use]
pub fn title_from(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_the_title() {
        assert_eq!(title_from("Draft an invoice"), "Draft an invoice");
    }

    #[test]
    fn long_message_is_truncated_on_char_boundaries() {
        let message = "é".repeat(60);
        let title = title_from(&message);
        assert_eq!(title, format!("{}...", "é".repeat(50)));

        let exact = "a".repeat(50);
        assert_eq!(title_from(&exact), exact);
    }

    #[test]
    fn exchange_appends_a_pair() {
        let owner = UserId::generate();
        let mut conversation = Conversation::start(ConversationId::generate(), owner, "hi");
        conversation.push_exchange("hi", "hello");
        conversation.push_exchange("more", "sure");

        let roles: Vec<_> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(conversation.credits_used, 2);
        assert!(conversation.is_owned_by(&owner));
        assert!(!conversation.is_owned_by(&UserId::generate()));
    }
}
