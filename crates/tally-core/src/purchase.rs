//! One-time credit purchases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PurchaseId, UserId};

/// An immutable record of a completed credit purchase.
///
/// The provider's payment-intent id is unique across all purchases and is the
/// idempotency key: a second purchase with the same intent adds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPurchase {
    /// Purchase id.
    pub purchase_id: PurchaseId,
    /// Buyer.
    pub user_id: UserId,
    /// Provider payment-intent id.
    pub payment_intent_id: String,
    /// Credits granted.
    pub credits_amount: i64,
    /// Amount paid in minor currency units.
    pub amount_paid: i64,
    /// Purchase status.
    pub status: PurchaseStatus,
    /// When the purchase was recorded.
    pub created_at: DateTime<Utc>,
}

impl CreditPurchase {
    /// Build a completed purchase.
    #[must_use]
    pub fn completed(
        user_id: UserId,
        payment_intent_id: impl Into<String>,
        credits_amount: i64,
        amount_paid: i64,
    ) -> Self {
        Self {
            purchase_id: PurchaseId::generate(),
            user_id,
            payment_intent_id: payment_intent_id.into(),
            credits_amount,
            amount_paid,
            status: PurchaseStatus::Completed,
            created_at: Utc::now(),
        }
    }
}

/// Purchase status. Only completed purchases are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Payment captured and credits granted.
    Completed,
}
