//! Billing provider webhook handler.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::processor::ProcessError;
use crate::state::AppState;

/// Header carrying the provider signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always `true`; failures are reported as errors.
    pub received: bool,
}

/// Handle a billing provider webhook.
///
/// The body is taken as raw bytes because the signature covers them exactly.
/// Processing runs on its own task so it completes even if the provider
/// disconnects first.
pub async fn billing_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let processor = state.processor.clone();
    let outcome = tokio::spawn(async move { processor.handle(&body, signature.as_deref()).await })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Webhook processing task failed");
            ApiError::Internal(e.to_string())
        })?;

    match outcome {
        Ok(_) => Ok(Json(WebhookResponse { received: true })),
        Err(ProcessError::Authentication(e)) => Err(ApiError::Authentication(format!(
            "Webhook signature verification failed: {e}"
        ))),
        Err(ProcessError::Upstream(msg)) => Err(ApiError::Upstream(msg)),
        Err(ProcessError::Storage(e)) => {
            tracing::error!(error = %e, "Webhook processing failed - provider will retry");
            Err(ApiError::Internal(e.to_string()))
        }
    }
}
