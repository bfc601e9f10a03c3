//! Request and response types for the tally client.

use serde::{Deserialize, Serialize};

use tally_core::{DocumentType, TransactionType, UserId};

/// Assistant message request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// The user's message.
    pub message: String,
    /// The paying user.
    pub user_id: UserId,
    /// Conversation to continue; a new one is started when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl MessageRequest {
    /// Start a new conversation with `message`.
    #[must_use]
    pub fn new(user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id,
            conversation_id: None,
        }
    }

    /// Continue `conversation_id`.
    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Assistant message response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    /// Assistant reply.
    pub response: String,
    /// Conversation the exchange belongs to.
    pub conversation_id: String,
    /// Balance after paying for the exchange.
    pub credits_remaining: i64,
    /// Whether a document was recorded from the reply.
    pub document_generated: bool,
    /// Kind of the recorded document.
    #[serde(default)]
    pub document_type: Option<DocumentType>,
}

/// What a checkout sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutType {
    /// A recurring plan.
    #[default]
    Subscription,
    /// A one-time credit pack.
    Credits,
}

/// Checkout request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Provider price to buy.
    pub price_id: String,
    /// The buyer.
    pub user_id: UserId,
    /// What is being bought.
    #[serde(rename = "type")]
    pub kind: CheckoutType,
}

/// Checkout response.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutResponse {
    /// Hosted checkout page to redirect the user to.
    pub url: String,
}

/// A ledger as returned by the admin API.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    /// User ID.
    pub user_id: String,
    /// Current credits.
    pub credits: i64,
    /// Subscription standing (`none`, `active`, `inactive`, `canceled`).
    pub subscription_status: String,
    /// Backing subscription.
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Credits bought.
    pub lifetime_purchased: i64,
    /// Credits granted by subscriptions.
    pub lifetime_granted: i64,
    /// Credits spent.
    pub lifetime_used: i64,
    /// Created timestamp (RFC 3339).
    pub created_at: String,
}

/// One credit transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Transaction ID.
    pub id: String,
    /// Signed change.
    pub amount: i64,
    /// Kind of change.
    pub transaction_type: TransactionType,
    /// Balance afterwards.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// Extra context.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Created timestamp (RFC 3339).
    pub created_at: String,
}

/// Transaction page.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionList {
    /// Newest first.
    pub transactions: Vec<Transaction>,
}

/// Error response body from the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    #[serde(default)]
    pub code: Option<String>,
}
