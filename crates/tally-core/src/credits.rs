//! Credit arithmetic and the credit transaction log.
//!
//! Every change to a ledger balance is expressed as a [`CreditDelta`] and
//! recorded as a [`CreditTransaction`]. The arithmetic here is the single place
//! that decides whether a change is allowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// How a delta is combined with the current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// `new = current + amount`; `amount` may be negative for spends.
    Add,
    /// `new = amount`, regardless of the current balance.
    Set,
}

/// A requested balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDelta {
    /// Combination mode.
    pub mode: ApplyMode,
    /// Signed amount for `Add`, target balance for `Set`.
    pub amount: i64,
}

impl CreditDelta {
    /// Add `amount` credits (negative amounts spend).
    #[must_use]
    pub const fn add(amount: i64) -> Self {
        Self {
            mode: ApplyMode::Add,
            amount,
        }
    }

    /// Spend `amount` credits.
    #[must_use]
    pub const fn spend(amount: i64) -> Self {
        Self::add(-amount)
    }

    /// Overwrite the balance with `amount`.
    #[must_use]
    pub const fn set(amount: i64) -> Self {
        Self {
            mode: ApplyMode::Set,
            amount,
        }
    }

    /// Compute the balance that results from applying this delta.
    ///
    /// # Errors
    ///
    /// Returns [`CreditError::InsufficientBalance`] if an `Add` would take the
    /// balance below zero, [`CreditError::NegativeTarget`] for a negative `Set`
    /// and [`CreditError::Overflow`] if the sum does not fit in an `i64`.
    pub fn apply_to(&self, current: i64) -> Result<i64, CreditError> {
        match self.mode {
            ApplyMode::Add => {
                let next = current
                    .checked_add(self.amount)
                    .ok_or(CreditError::Overflow)?;
                if next < 0 {
                    return Err(CreditError::InsufficientBalance {
                        balance: current,
                        requested: self.amount,
                    });
                }
                Ok(next)
            }
            ApplyMode::Set if self.amount < 0 => Err(CreditError::NegativeTarget(self.amount)),
            ApplyMode::Set => Ok(self.amount),
        }
    }
}

/// Errors produced by credit arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditError {
    /// The change would make the balance negative.
    #[error("insufficient balance: balance={balance}, requested={requested}")]
    InsufficientBalance {
        /// Balance before the change.
        balance: i64,
        /// The signed amount that was requested.
        requested: i64,
    },

    /// A `Set` asked for a negative balance.
    #[error("cannot set a negative balance: {0}")]
    NegativeTarget(i64),

    /// The resulting balance does not fit in an `i64`.
    #[error("credit balance overflow")]
    Overflow,
}

/// A credit transaction representing one applied balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance changed.
    pub user_id: UserId,

    /// Signed change actually applied (for `Set`, the difference to the old balance).
    pub amount: i64,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Balance after this transaction.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// Additional metadata (event id, payment intent, conversation, ...).
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Record a change from `balance_before` to `balance_after`.
    #[must_use]
    pub fn record(
        user_id: UserId,
        transaction_type: TransactionType,
        balance_before: i64,
        balance_after: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount: balance_after - balance_before,
            transaction_type,
            balance_after,
            description: description.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach metadata to the transaction.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// One-time credit purchase.
    Purchase,

    /// Subscription allotment added on top of the balance.
    SubscriptionGrant,

    /// Subscription allotment that overwrote the balance.
    SubscriptionReset,

    /// One metered assistant exchange.
    Usage,

    /// Manual correction or bonus by an administrator.
    Adjustment,
}
