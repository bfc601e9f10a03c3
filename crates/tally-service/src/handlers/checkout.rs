//! Checkout initiation handler.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::UserId;
use tally_store::StoreRead;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{CheckoutKind, CheckoutRequest};

/// Checkout request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    /// Provider price to buy.
    pub price_id: Option<String>,
    /// The buyer.
    pub user_id: Option<String>,
    /// `subscription` (default) or `credits`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Checkout response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted checkout page.
    pub url: String,
}

/// Start a hosted checkout for a subscription or a credit pack.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let Json(body) = body?;
    let price_id = body
        .price_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("priceId is required".into()))?;
    let user_id: UserId = body
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::Validation("userId is required".into()))?
        .parse()
        .map_err(|_| ApiError::Validation("userId must be a valid user id".into()))?;
    let kind = match body.kind.as_deref() {
        None => CheckoutKind::default(),
        Some(raw) => raw.parse().map_err(ApiError::Validation)?,
    };

    if state.store.get_ledger(&user_id)?.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let stripe = state.stripe.as_ref().ok_or_else(|| {
        tracing::error!("Stripe not configured - cannot create checkout");
        ApiError::Upstream("Payments not configured".into())
    })?;

    let frontend = state.config.frontend_url.trim_end_matches('/');
    let success_url = format!("{frontend}/billing?success=true&session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{frontend}/billing?canceled=true");

    let session = stripe
        .create_checkout_session(&CheckoutRequest {
            kind,
            price_id: &price_id,
            user_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await
        .map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "Failed to create checkout session");
            ApiError::Upstream(format!("Failed to create checkout session: {e}"))
        })?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Upstream("Checkout session has no URL".into()))?;

    tracing::info!(user_id = %user_id, session_id = %session.id, kind = %kind, "Checkout session created");

    Ok(Json(CheckoutResponse { url }))
}
