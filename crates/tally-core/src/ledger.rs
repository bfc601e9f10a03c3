//! The per-user credit ledger.
//!
//! A ledger is created when an account is provisioned and is never deleted.
//! Its balance only changes through [`UserLedger::apply_delta`], which the
//! store invokes from inside a per-user transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::{CreditDelta, CreditError, TransactionType};
use crate::UserId;

/// A user's spendable balance and subscription standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLedger {
    /// The owning user.
    pub user_id: UserId,

    /// Current spendable credits. Never negative.
    pub credits: i64,

    /// Coarse subscription standing mirrored from billing events.
    pub subscription_status: SubscriptionStatus,

    /// Provider id of the subscription currently backing this ledger.
    pub subscription_id: Option<String>,

    /// Credits bought through one-time purchases.
    pub lifetime_purchased: i64,

    /// Credits granted by subscription allotments.
    pub lifetime_granted: i64,

    /// Credits spent on metered exchanges.
    pub lifetime_used: i64,

    /// When the ledger was provisioned.
    pub created_at: DateTime<Utc>,

    /// When the ledger last changed.
    pub updated_at: DateTime<Utc>,
}

impl UserLedger {
    /// Create a ledger with zero credits and no subscription.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credits: 0,
            subscription_status: SubscriptionStatus::None,
            subscription_id: None,
            lifetime_purchased: 0,
            lifetime_granted: 0,
            lifetime_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether at least one credit is available.
    #[must_use]
    pub const fn has_credits(&self) -> bool {
        self.credits > 0
    }

    /// Apply a balance change and update the lifetime counters.
    ///
    /// Returns the balance before the change.
    ///
    /// # Errors
    ///
    /// Propagates [`CreditError`] from the arithmetic; the ledger is left
    /// untouched on error.
    pub fn apply_delta(
        &mut self,
        delta: CreditDelta,
        kind: TransactionType,
    ) -> Result<i64, CreditError> {
        let before = self.credits;
        let after = delta.apply_to(before)?;

        match kind {
            TransactionType::Purchase => self.lifetime_purchased += after - before,
            TransactionType::SubscriptionGrant | TransactionType::SubscriptionReset => {
                self.lifetime_granted += delta.amount;
            }
            TransactionType::Usage => self.lifetime_used += before - after,
            TransactionType::Adjustment => {}
        }

        self.credits = after;
        self.touch();
        Ok(before)
    }

    /// Make `subscription_id` the active subscription of this ledger.
    pub fn attach_subscription(&mut self, subscription_id: &str) {
        self.subscription_status = SubscriptionStatus::Active;
        self.subscription_id = Some(subscription_id.to_string());
        self.touch();
    }

    /// Mirror a provider status change onto the ledger.
    ///
    /// Only applies when the ledger has no subscription or references this
    /// one, so an old subscription cannot overwrite the standing of a newer
    /// one. Returns whether the ledger changed.
    pub fn mirror_subscription(&mut self, subscription_id: &str, active: bool) -> bool {
        match self.subscription_id.as_deref() {
            Some(current) if current != subscription_id => false,
            _ => {
                self.subscription_status = if active {
                    SubscriptionStatus::Active
                } else {
                    SubscriptionStatus::Inactive
                };
                if active {
                    self.subscription_id = Some(subscription_id.to_string());
                }
                self.touch();
                true
            }
        }
    }

    /// Drop the reference to a deleted subscription.
    ///
    /// Credits are kept. Returns whether the ledger changed.
    pub fn detach_subscription(&mut self, subscription_id: &str) -> bool {
        match self.subscription_id.as_deref() {
            Some(current) if current != subscription_id => false,
            _ => {
                self.subscription_status = SubscriptionStatus::Inactive;
                self.subscription_id = None;
                self.touch();
                true
            }
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Coarse subscription standing of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Never subscribed.
    #[default]
    None,

    /// A subscription is active.
    Active,

    /// The subscription lapsed or was deleted.
    Inactive,

    /// Canceled by an operator.
    Canceled,
}

impl SubscriptionStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Canceled => "canceled",
        }
    }
}
