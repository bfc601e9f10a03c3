//! Credit pricing.
//!
//! One table decides how many credits a payment buys and how many credits a
//! subscription grants per period.
//!
//! # Defaults
//!
//! - 1 currency unit (100 minor units) buys 10 credits; partial credits are
//!   floored, so 150 minor units buy 15 credits and 5 minor units buy none.
//! - A subscription grants 100 credits per period unless its price id has an
//!   explicit plan.
//! - A new subscription checkout resets the balance to the allotment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::credits::CreditDelta;
use crate::error::PricingError;

/// Default credits bought per currency unit.
pub const DEFAULT_CREDITS_PER_UNIT: i64 = 10;

/// Default minor units per currency unit (cents per dollar).
pub const DEFAULT_MINOR_UNITS_PER_UNIT: i64 = 100;

/// Default credits granted by a subscription checkout.
pub const DEFAULT_MONTHLY_CREDITS: i64 = 100;

/// Pricing rules for purchases and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Credits bought per currency unit.
    pub credits_per_unit: i64,

    /// Minor units that make one currency unit.
    pub minor_units_per_unit: i64,

    /// Allotment for subscriptions without an explicit plan.
    pub default_monthly_credits: i64,

    /// Per-price plan overrides, keyed by provider price id.
    pub plans: HashMap<String, PlanPricing>,

    /// How a subscription allotment combines with the remaining balance.
    pub renewal: RenewalPolicy,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            credits_per_unit: DEFAULT_CREDITS_PER_UNIT,
            minor_units_per_unit: DEFAULT_MINOR_UNITS_PER_UNIT,
            default_monthly_credits: DEFAULT_MONTHLY_CREDITS,
            plans: HashMap::new(),
            renewal: RenewalPolicy::default(),
        }
    }
}

impl PricingTable {
    /// Credits bought by a payment of `amount_minor` minor units.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidAmount`] for negative amounts and
    /// [`PricingError::InvalidRate`] if the table's unit size is not positive.
    pub fn credits_for_payment(&self, amount_minor: i64) -> Result<i64, PricingError> {
        if amount_minor < 0 {
            return Err(PricingError::InvalidAmount(amount_minor));
        }
        if self.minor_units_per_unit <= 0 {
            return Err(PricingError::InvalidRate);
        }
        let scaled = amount_minor
            .checked_mul(self.credits_per_unit)
            .ok_or(PricingError::InvalidAmount(amount_minor))?;
        Ok(scaled / self.minor_units_per_unit)
    }

    /// Credits granted per period for `price_id`.
    #[must_use]
    pub fn monthly_allotment(&self, price_id: Option<&str>) -> i64 {
        price_id
            .and_then(|id| self.plans.get(id))
            .map_or(self.default_monthly_credits, |plan| plan.monthly_credits)
    }

    /// The balance change a subscription checkout applies for `price_id`.
    #[must_use]
    pub fn subscription_delta(&self, price_id: Option<&str>) -> CreditDelta {
        let allotment = self.monthly_allotment(price_id);
        match self.renewal {
            RenewalPolicy::Reset => CreditDelta::set(allotment),
            RenewalPolicy::CarryOver => CreditDelta::add(allotment),
        }
    }

    /// Register a plan allotment for `price_id`.
    #[must_use]
    pub fn with_plan(mut self, price_id: impl Into<String>, monthly_credits: i64) -> Self {
        self.plans
            .insert(price_id.into(), PlanPricing { monthly_credits });
        self
    }
}

/// Allotment of one subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPricing {
    /// Credits granted per billing period.
    pub monthly_credits: i64,
}

/// How a subscription allotment combines with the remaining balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalPolicy {
    /// Overwrite the balance with the allotment.
    #[default]
    Reset,
    /// Add the allotment to the balance.
    CarryOver,
}

impl FromStr for RenewalPolicy {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(Self::Reset),
            "carry_over" | "carryover" | "carry-over" => Ok(Self::CarryOver),
            other => Err(PricingError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for RenewalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "reset"),
            Self::CarryOver => write!(f, "carry_over"),
        }
    }
}
