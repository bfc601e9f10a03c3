//! Stripe integration: API client, wire types and webhook handling.

mod client;
pub mod types;
pub mod webhook;

pub use client::{CheckoutRequest, StripeClient, StripeError};
pub use types::{CheckoutKind, CheckoutSession, Subscription};
pub use webhook::{sign_payload, verify_signature, BillingEvent, EventEnvelope, SignatureError};
