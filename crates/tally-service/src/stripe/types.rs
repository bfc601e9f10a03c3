//! Stripe API types.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::ProviderSubscriptionStatus;

/// Stripe metadata: a flat string map that may be missing or `null`.
pub type Metadata = Option<HashMap<String, String>>;

fn metadata_value<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .as_ref()
        .and_then(|m| m.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// `payment` or `subscription`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Payment status.
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Total amount in minor units.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Client reference ID (our `user_id`).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Payment intent ID (payment mode).
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Subscription ID (subscription mode).
    #[serde(default)]
    pub subscription: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl CheckoutSession {
    /// Our user id, from `metadata.user_id` or `client_reference_id`.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        metadata_value(&self.metadata, "user_id").or(self
            .client_reference_id
            .as_deref()
            .filter(|v| !v.is_empty()))
    }

    /// The raw `metadata.type`, if present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        metadata_value(&self.metadata, "type")
    }
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Status.
    pub status: ProviderSubscriptionStatus,
    /// Current period start (Unix).
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Current period end (Unix).
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Subscription items.
    #[serde(default)]
    pub items: Option<StripeList<SubscriptionItem>>,
}

impl Subscription {
    /// Our user id, from `metadata.user_id`.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        metadata_value(&self.metadata, "user_id")
    }

    /// Price of the first item.
    #[must_use]
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .as_ref()
            .and_then(|items| items.data.first())
            .map(|item| item.price.id.as_str())
    }

    /// Current period start as a timestamp.
    #[must_use]
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start
            .and_then(|t| DateTime::from_timestamp(t, 0))
    }

    /// Current period end as a timestamp.
    #[must_use]
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .and_then(|t| DateTime::from_timestamp(t, 0))
    }
}

/// One item of a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// Item price.
    pub price: Price,
}

/// A Stripe price reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Price ID.
    pub id: String,
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: Option<i64>,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// What a checkout sells, carried in `metadata.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutKind {
    /// A recurring subscription.
    #[default]
    Subscription,
    /// A one-time credit purchase.
    Credits,
}

impl CheckoutKind {
    /// Stripe checkout `mode` for this kind.
    #[must_use]
    pub const fn mode(self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Credits => "payment",
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Credits => "credits",
        }
    }
}

impl FromStr for CheckoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(Self::Subscription),
            "credits" => Ok(Self::Credits),
            other => Err(format!("unknown checkout type: {other}")),
        }
    }
}

impl fmt::Display for CheckoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stripe error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error details.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
