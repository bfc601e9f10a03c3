//! Assistant message handler.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::DocumentType;

use crate::error::ApiError;
use crate::metering::Exchange;
use crate::state::AppState;

/// Assistant message request.
///
/// Required fields are optional here so that a missing field is reported as
/// a validation error in the service's error shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// The user's message.
    pub message: Option<String>,
    /// The paying user.
    pub user_id: Option<String>,
    /// Existing conversation to continue.
    pub conversation_id: Option<String>,
}

/// Assistant message response.
#[derive(Debug, Serialize)]
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
}

impl From<Exchange> for MessageResponse {
    fn from(exchange: Exchange) -> Self {
        Self {
            response: exchange.response,
            conversation_id: exchange.conversation_id.to_string(),
            credits_remaining: exchange.credits_remaining,
            document_generated: exchange.document_type.is_some(),
            document_type: exchange.document_type,
        }
    }
}

/// Send one message to the assistant, paying one credit.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = body?;
    let message = body
        .message
        .ok_or_else(|| ApiError::Validation("message is required".into()))?;
    let user_id = body
        .user_id
        .ok_or_else(|| ApiError::Validation("userId is required".into()))?;

    let exchange = state
        .meter
        .consume(&user_id, body.conversation_id.as_deref(), &message)
        .await?;

    Ok(Json(MessageResponse::from(exchange)))
}
