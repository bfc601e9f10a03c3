//! Account administration handlers (admin key required).

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{CreditDelta, CreditTransaction, TransactionType, UserId, UserLedger};
use tally_store::StoreRead;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for transaction listings.
const DEFAULT_TRANSACTION_LIMIT: usize = 50;

/// Largest accepted page size.
const MAX_TRANSACTION_LIMIT: usize = 500;

/// Ledger response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Current credits.
    pub credits: i64,
    /// Subscription standing.
    pub subscription_status: &'static str,
    /// Backing subscription.
    pub subscription_id: Option<String>,
    /// Credits bought.
    pub lifetime_purchased: i64,
    /// Credits granted by subscriptions.
    pub lifetime_granted: i64,
    /// Credits spent.
    pub lifetime_used: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&UserLedger> for AccountResponse {
    fn from(ledger: &UserLedger) -> Self {
        Self {
            user_id: ledger.user_id.to_string(),
            credits: ledger.credits,
            subscription_status: ledger.subscription_status.as_str(),
            subscription_id: ledger.subscription_id.clone(),
            lifetime_purchased: ledger.lifetime_purchased,
            lifetime_granted: ledger.lifetime_granted,
            lifetime_used: ledger.lifetime_used,
            created_at: ledger.created_at.to_rfc3339(),
        }
    }
}

/// Provision request.
#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountRequest {
    /// User to provision; generated when absent.
    pub user_id: Option<String>,
}

/// Provision a ledger.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Json<AccountResponse>, ApiError> {
    let Json(body) = body?;
    let user_id = match body.user_id.as_deref() {
        Some(raw) => parse_user_id(raw)?,
        None => UserId::generate(),
    };

    let ledger = UserLedger::new(user_id);
    state.store.create_ledger(&ledger)?;

    tracing::info!(user_id = %user_id, admin_id = %admin.admin_id, "Ledger provisioned");

    Ok(Json(AccountResponse::from(&ledger)))
}

/// Read a ledger.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let ledger = state
        .store
        .get_ledger(&user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&ledger)))
}

/// Pagination parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Page size (default 50, max 500).
    pub limit: Option<usize>,
    /// Entries to skip.
    pub offset: Option<usize>,
}

/// One credit transaction.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
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
    pub metadata: serde_json::Value,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Transaction page.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Newest first.
    pub transactions: Vec<TransactionResponse>,
}

/// List a ledger's credit transactions, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(user_id): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    if state.store.get_ledger(&user_id)?.is_none() {
        return Err(ApiError::NotFound("Account not found".into()));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTION_LIMIT)
        .min(MAX_TRANSACTION_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let transactions = state
        .store
        .list_transactions_by_user(&user_id, limit, offset)?
        .iter()
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse { transactions }))
}

/// Manual credit adjustment.
#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Signed number of credits to add.
    pub amount: i64,
    /// Reason, recorded on the transaction.
    pub reason: String,
}

/// Balance after an adjustment.
#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    /// New balance.
    pub credits: i64,
}

/// Add (or with a negative amount, remove) credits by hand.
pub async fn adjust_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
    body: Result<Json<AdjustCreditsRequest>, JsonRejection>,
) -> Result<Json<AdjustCreditsResponse>, ApiError> {
    let Json(body) = body?;
    let user_id = parse_user_id(&user_id)?;
    if body.amount == 0 {
        return Err(ApiError::Validation("amount must not be zero".into()));
    }
    if body.reason.trim().is_empty() {
        return Err(ApiError::Validation("reason is required".into()));
    }

    let credits = state.engine.apply_delta(
        &user_id,
        CreditDelta::add(body.amount),
        TransactionType::Adjustment,
        &body.reason,
    )?;

    tracing::info!(
        user_id = %user_id,
        admin_id = %admin.admin_id,
        amount = body.amount,
        reason = %body.reason,
        credits,
        "Credits adjusted"
    );

    Ok(Json(AdjustCreditsResponse { credits }))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation("Invalid user ID".into()))
}
