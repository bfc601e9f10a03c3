//! Usage metering for assistant exchanges.
//!
//! One exchange costs one credit. The balance is checked before the model is
//! called and the credit is taken after it answers, in the same transaction
//! that appends the exchange to the conversation. A model failure or a lost
//! race for the last credit leaves the ledger and the conversation untouched.

use std::sync::Arc;

use serde_json::json;

use tally_core::{
    classify, Conversation, ConversationId, CreditDelta, DocumentType, GeneratedDocument,
    TransactionType, UserId,
};
use tally_store::{Store, StoreError, StoreRead};

use crate::ai::{build_prompt, AiError, ChatModel};
use crate::engine::CreditEngine;
use crate::error::ApiError;

/// Result of a metered exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Assistant reply.
    pub response: String,
    /// Conversation the exchange was appended to.
    pub conversation_id: ConversationId,
    /// Balance after the deduction.
    pub credits_remaining: i64,
    /// Kind of document recorded from the reply, if any.
    pub document_type: Option<DocumentType>,
}

/// Metering failures.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// Bad input.
    #[error("{0}")]
    Validation(String),

    /// Unknown user or conversation.
    #[error("{0}")]
    NotFound(String),

    /// No credit left to pay for the exchange.
    #[error("insufficient credits (balance {balance})")]
    InsufficientCredits {
        /// Balance at the time of the check.
        balance: i64,
    },

    /// The model could not produce a reply.
    #[error("AI provider failed: {0}")]
    Upstream(String),

    /// The store failed.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl From<MeterError> for ApiError {
    fn from(err: MeterError) -> Self {
        match err {
            MeterError::Validation(msg) => Self::Validation(msg),
            MeterError::NotFound(msg) => Self::NotFound(msg),
            MeterError::InsufficientCredits { balance } => Self::InsufficientCredits { balance },
            MeterError::Upstream(msg) => Self::Upstream(msg),
            MeterError::Storage(e) => e.into(),
        }
    }
}

/// Gates and bills assistant exchanges against the ledger.
#[derive(Clone)]
pub struct UsageMeter {
    store: Arc<dyn Store>,
    engine: CreditEngine,
    model: Option<Arc<dyn ChatModel>>,
}

impl UsageMeter {
    /// Create a meter. Without a model every exchange fails upstream.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            engine: CreditEngine::new(Arc::clone(&store)),
            store,
            model,
        }
    }

    /// Run one paid exchange for `user_id`.
    pub async fn consume(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<Exchange, MeterError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(MeterError::Validation("message is required".into()));
        }
        let user_id: UserId = user_id
            .trim()
            .parse()
            .map_err(|_| MeterError::Validation("userId must be a valid user id".into()))?;
        let conversation_id = conversation_id
            .map(|raw| {
                raw.trim().parse::<ConversationId>().map_err(|_| {
                    MeterError::Validation("conversationId must be a valid conversation id".into())
                })
            })
            .transpose()?;

        let ledger = self
            .store
            .get_ledger(&user_id)?
            .ok_or_else(|| MeterError::NotFound("User not found".into()))?;
        if !ledger.has_credits() {
            tracing::info!(user_id = %user_id, balance = ledger.credits, "Exchange refused - no credits");
            return Err(MeterError::InsufficientCredits {
                balance: ledger.credits,
            });
        }

        let history = match conversation_id {
            Some(id) => {
                let conversation = self
                    .store
                    .get_conversation(&id)?
                    .filter(|c| c.is_owned_by(&user_id))
                    .ok_or_else(|| MeterError::NotFound("Conversation not found".into()))?;
                conversation.messages
            }
            None => Vec::new(),
        };

        let model = self.model.as_ref().ok_or_else(|| {
            let err = AiError::NotConfigured;
            tracing::error!(error = %err, "Assistant request without a model");
            MeterError::Upstream(err.to_string())
        })?;

        let reply = model
            .complete(&build_prompt(&history, message))
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user_id, error = %e, "AI completion failed - no credit taken");
                MeterError::Upstream(e.to_string())
            })?;

        let conversation_id = conversation_id.unwrap_or_else(ConversationId::generate);
        let credits_remaining = self
            .engine
            .atomically(&user_id, |txn| {
                let balance = txn.apply_credits(
                    CreditDelta::spend(1),
                    TransactionType::Usage,
                    "Assistant message",
                    json!({ "conversation_id": conversation_id.to_string() }),
                )?;

                let mut conversation = match txn.conversation(&conversation_id)? {
                    Some(existing) if existing.is_owned_by(&user_id) => existing,
                    Some(_) => {
                        return Err(StoreError::NotFound {
                            entity: "conversation",
                            id: conversation_id.to_string(),
                        })
                    }
                    None => Conversation::start(conversation_id, user_id, message),
                };
                conversation.push_exchange(message, &reply);
                txn.put_conversation(conversation);
                Ok(balance)
            })
            .map_err(|e| match e {
                StoreError::InsufficientBalance { balance, .. } => {
                    tracing::info!(user_id = %user_id, "Lost the race for the last credit - reply discarded");
                    MeterError::InsufficientCredits { balance }
                }
                StoreError::NotFound { entity, .. } => MeterError::NotFound(format!("{entity} not found")),
                other => MeterError::Storage(other),
            })?;

        let document_type = self.record_document(user_id, conversation_id, &reply);

        tracing::info!(
            user_id = %user_id,
            conversation_id = %conversation_id,
            credits_remaining,
            "Assistant exchange metered"
        );

        Ok(Exchange {
            response: reply,
            conversation_id,
            credits_remaining,
            document_type,
        })
    }

    /// Store a document for a classified reply. Failures are logged only.
    fn record_document(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        reply: &str,
    ) -> Option<DocumentType> {
        let document_type = classify(reply)?;
        let document = GeneratedDocument::from_reply(user_id, conversation_id, document_type, reply);
        if let Err(e) = self.store.put_document(&document) {
            tracing::warn!(
                user_id = %user_id,
                conversation_id = %conversation_id,
                error = %e,
                "Failed to store generated document"
            );
        }
        Some(document_type)
    }
}
