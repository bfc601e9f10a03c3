//! Core types for tally.
//!
//! This crate holds the domain model shared by the store, the service and the
//! client:
//!
//! - **Identifiers**: `UserId`, `ConversationId`, `DocumentId`, `TransactionId`, `PurchaseId`
//! - **Ledger**: `UserLedger`, `SubscriptionStatus`
//! - **Credits**: `CreditDelta`, `CreditTransaction`, `TransactionType`
//! - **Billing**: `SubscriptionRecord`, `CreditPurchase`, `ProcessedEvent`
//! - **Pricing**: `PricingTable`, `RenewalPolicy`
//! - **Assistant**: `Conversation`, `GeneratedDocument`
//!
//! # Credits
//!
//! A credit pays for one assistant exchange. Balances are `i64` and never
//! negative; every change goes through [`CreditDelta::apply_to`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod conversation;
pub mod credits;
pub mod document;
pub mod error;
pub mod event;
pub mod ids;
pub mod ledger;
pub mod pricing;
pub mod purchase;
pub mod subscription;

pub use conversation::{title_from, ChatMessage, Conversation, Role, TITLE_MAX_CHARS};
pub use credits::{ApplyMode, CreditDelta, CreditError, CreditTransaction, TransactionType};
pub use document::{classify, DocumentType, GeneratedDocument};
pub use error::PricingError;
pub use event::ProcessedEvent;
pub use ids::{ConversationId, DocumentId, IdError, PurchaseId, TransactionId, UserId};
pub use ledger::{SubscriptionStatus, UserLedger};
pub use pricing::{
    PlanPricing, PricingTable, RenewalPolicy, DEFAULT_CREDITS_PER_UNIT, DEFAULT_MINOR_UNITS_PER_UNIT,
    DEFAULT_MONTHLY_CREDITS,
};
pub use purchase::{CreditPurchase, PurchaseStatus};
pub use subscription::{ProviderSubscriptionStatus, SubscriptionRecord};
