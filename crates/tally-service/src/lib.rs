//! Tally HTTP API service.
//!
//! This crate provides the HTTP API for tally:
//!
//! - Stripe webhook processing into the credit ledger
//! - Checkout initiation for subscriptions and credit packs
//! - The metered AI assistant (one credit per exchange)
//! - Admin account management
//!
//! # Authentication
//!
//! Webhooks are authenticated by their Stripe signature; admin routes by the
//! `X-Admin-Key` header. Assistant and checkout requests name their user in
//! the body and are expected to sit behind the application's own gateway.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod ai;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metering;
pub mod processor;
pub mod routes;
pub mod state;
pub mod stripe;

pub use ai::{AiError, ChatModel, OpenAiClient, PromptMessage};
pub use config::ServiceConfig;
pub use engine::CreditEngine;
pub use error::ApiError;
pub use metering::{Exchange, MeterError, UsageMeter};
pub use processor::{Outcome, ProcessError, WebhookProcessor};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
