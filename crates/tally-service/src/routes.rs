//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, assistant, checkout, health, webhooks};
use crate::state::AppState;

/// Maximum concurrent assistant requests. Each one holds an AI call open.
const ASSISTANT_MAX_CONCURRENT_REQUESTS: usize = 32;

/// Maximum concurrent requests for the remaining API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /assistant/message` - Metered assistant exchange
/// - `POST /billing/checkout` - Start a hosted checkout
///
/// ## Admin (`X-Admin-Key`)
/// - `POST /v1/accounts` - Provision a ledger
/// - `GET /v1/accounts/:user_id` - Read a ledger
/// - `GET /v1/accounts/:user_id/transactions` - List credit transactions
/// - `POST /v1/accounts/:user_id/credits` - Manual adjustment
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/billing` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let assistant_routes = Router::new()
        .route("/message", post(assistant::send_message))
        .layer(ConcurrencyLimitLayer::new(ASSISTANT_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/:user_id", get(accounts::get_account))
        .route(
            "/accounts/:user_id/transactions",
            get(accounts::list_transactions),
        )
        .route("/accounts/:user_id/credits", post(accounts::adjust_credits))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/assistant", assistant_routes)
        .route("/billing/checkout", post(checkout::create_checkout))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - the provider controls delivery)
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(origins)
    }
}
