//! Documents recognised in assistant replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, DocumentId, UserId};

/// Kind of generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// An invoice.
    Invoice,
    /// A contract.
    Contract,
}

impl DocumentType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Contract => "contract",
        }
    }

    /// Default title of a document of this kind.
    #[must_use]
    pub const fn default_title(self) -> &'static str {
        match self {
            Self::Invoice => "Generated Invoice",
            Self::Contract => "Generated Contract",
        }
    }
}

/// Classify an assistant reply by keyword.
///
/// Invoice wins over contract. Matching is case-insensitive.
#[must_use]
pub fn classify(reply: &str) -> Option<DocumentType> {
    let lower = reply.to_lowercase();
    if lower.contains("invoice") && (lower.contains("client") || lower.contains("service")) {
        Some(DocumentType::Invoice)
    } else if lower.contains("contract") && lower.contains("terms") {
        Some(DocumentType::Contract)
    } else {
        None
    }
}

/// A document extracted from an assistant reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    /// Document id.
    pub document_id: DocumentId,
    /// Owner.
    pub user_id: UserId,
    /// Conversation the reply belongs to.
    pub conversation_id: ConversationId,
    /// Kind.
    pub document_type: DocumentType,
    /// Display title.
    pub title: String,
    /// Structured content.
    pub content: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl GeneratedDocument {
    /// Build a document of `document_type` wrapping `reply`.
    #[must_use]
    pub fn from_reply(
        user_id: UserId,
        conversation_id: ConversationId,
        document_type: DocumentType,
        reply: &str,
    ) -> Self {
        let created_at = Utc::now();
        let title = document_type.default_title().to_string();
        Self {
            document_id: DocumentId::generate(),
            user_id,
            conversation_id,
            document_type,
            content: serde_json::json!({
                "type": document_type.as_str(),
                "title": title,
                "content": reply,
                "generated_at": created_at.to_rfc3339(),
            }),
            title,
            created_at,
        }
    }
}
