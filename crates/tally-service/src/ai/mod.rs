//! AI chat providers.
//!
//! The meter talks to a [`ChatModel`]; production uses [`OpenAiClient`] and
//! tests substitute their own implementation.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::Serialize;

use tally_core::{ChatMessage, Role};

/// Instruction prepended to every conversation.
pub const SYSTEM_PROMPT: &str = "You are a financial assistant for trade businesses \
(electricians, plumbers, contractors, etc.). You help with:
1. Creating professional invoices
2. Drafting service contracts
3. Providing financial insights and analysis
4. Expense tracking and categorization
5. Business financial advice

Always be professional, helpful, and specific to trade business needs. When creating invoices \
or contracts, ask for necessary details like client information, services provided, rates, etc.";

/// One message of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Speaker, serialized as `system`, `user` or `assistant`.
    pub role: Role,
    /// Text.
    pub content: String,
}

impl PromptMessage {
    /// Build a message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// System instruction, then the stored history, then the new user message.
#[must_use]
pub fn build_prompt(history: &[ChatMessage], message: &str) -> Vec<PromptMessage> {
    let mut prompt = Vec::with_capacity(history.len() + 2);
    prompt.push(PromptMessage::new(Role::System, SYSTEM_PROMPT));
    prompt.extend(
        history
            .iter()
            .map(|turn| PromptMessage::new(turn.role, turn.content.clone())),
    );
    prompt.push(PromptMessage::new(Role::User, message));
    prompt
}

/// Errors from an AI provider.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// No provider is configured.
    #[error("AI provider not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error status.
    #[error("AI provider error: HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The provider answered without a completion.
    #[error("AI provider returned no completion")]
    EmptyCompletion,
}

/// A chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete `messages` and return the assistant's reply.
    ///
    /// Called exactly once per metered exchange.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn prompt_wraps_history() {
        let history = vec![
            ChatMessage {
                role: Role::User,
                content: "hi".into(),
                timestamp: Utc::now(),
            },
            ChatMessage {
                role: Role::Assistant,
                content: "hello".into(),
                timestamp: Utc::now(),
            },
        ];

        let prompt = build_prompt(&history, "draft an invoice");
        let roles: Vec<_> = prompt.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(prompt[0].content, SYSTEM_PROMPT);
        assert_eq!(prompt[3].content, "draft an invoice");
    }

    #[test]
    fn prompt_messages_serialize_with_lowercase_roles() {
        let json = serde_json::to_value(PromptMessage::new(Role::Assistant, "x")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "x"}));
    }
}
