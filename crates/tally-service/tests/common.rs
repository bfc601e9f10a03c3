//! Common test utilities for tally service integration tests.

#![allow(dead_code)] // Each test file uses a different subset

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::{TestResponse, TestServer};
use chrono::Utc;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_core::{PricingTable, UserId, UserLedger};
use tally_service::stripe::sign_payload;
use tally_service::{create_router, AiError, AppState, ChatModel, PromptMessage, ServiceConfig};
use tally_store::{MemoryStore, Store, StoreRead};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// A chat model that returns a fixed reply and counts its calls.
pub struct ScriptedModel {
    reply: String,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_after: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::replying("").failing_after(0)
    }

    /// Answer the first `answered` completions, then fail every later one.
    pub fn failing_after(mut self, answered: usize) -> Self {
        self.fail_after = Some(answered);
        self
    }

    /// Hold every completion open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, AiError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after.is_some_and(|answered| previous >= answered) {
            return Err(AiError::Api {
                status: 500,
                message: "model unavailable".into(),
            });
        }
        Ok(self.reply.clone())
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backing store, for direct assertions.
    pub store: Arc<MemoryStore>,
    /// The fake AI provider.
    pub model: Arc<ScriptedModel>,
    /// Mock Stripe API.
    pub stripe: MockServer,
}

impl TestHarness {
    /// A harness whose assistant always answers "Happy to help.".
    pub async fn new() -> Self {
        Self::with_model(ScriptedModel::replying("Happy to help.")).await
    }

    /// A harness using `model` as the AI provider.
    pub async fn with_model(model: ScriptedModel) -> Self {
        Self::build(model, PricingTable::default()).await
    }

    /// A harness with custom pricing.
    pub async fn with_pricing(pricing: PricingTable) -> Self {
        Self::build(ScriptedModel::replying("Happy to help."), pricing).await
    }

    async fn build(model: ScriptedModel, pricing: PricingTable) -> Self {
        let stripe = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(model);

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            stripe_api_key: Some("sk_test_123".into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            stripe_base_url: stripe.uri(),
            admin_api_key: Some(ADMIN_KEY.into()),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            pricing,
            ..ServiceConfig::default()
        };

        let chat: Arc<dyn ChatModel> = model.clone();
        let state = AppState::with_chat_model(store.clone(), config, Some(chat));
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            model,
            stripe,
        }
    }

    /// Provision a ledger holding `credits`.
    pub fn provision(&self, credits: i64) -> UserId {
        let user_id = UserId::generate();
        let mut ledger = UserLedger::new(user_id);
        ledger.credits = credits;
        self.store.create_ledger(&ledger).expect("create ledger");
        user_id
    }

    /// Current balance of `user_id`.
    pub fn credits(&self, user_id: &UserId) -> i64 {
        self.ledger(user_id).credits
    }

    pub fn ledger(&self, user_id: &UserId) -> UserLedger {
        self.store
            .get_ledger(user_id)
            .expect("read ledger")
            .expect("ledger exists")
    }

    /// Deliver `event` to the webhook endpoint with a valid signature.
    pub async fn deliver(&self, event: &Value) -> TestResponse {
        let body = event.to_string();
        let signature = sign_payload(body.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());
        self.deliver_raw(body, Some(signature)).await
    }

    /// Deliver a raw body with an optional signature header.
    pub async fn deliver_raw(&self, body: String, signature: Option<String>) -> TestResponse {
        let mut request = self.server.post("/webhooks/billing");
        if let Some(signature) = signature {
            request = request.add_header("stripe-signature", signature);
        }
        request.text(body).await
    }

    /// Serve `GET /subscriptions/{id}` from the mock Stripe API.
    pub async fn mock_subscription(&self, subscription: Value) {
        let id = subscription["id"].as_str().expect("subscription id").to_string();
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(subscription))
            .mount(&self.stripe)
            .await;
    }
}

// ============================================================================
// Event builders
// ============================================================================

pub fn event(id: &str, event_type: &str, created: i64, object: Value) -> Value {
    json!({
        "id": id,
        "type": event_type,
        "created": created,
        "data": { "object": object }
    })
}

pub fn credit_checkout(id: &str, user_id: &UserId, payment_intent: &str, amount: i64) -> Value {
    event(
        id,
        "checkout.session.completed",
        Utc::now().timestamp(),
        json!({
            "id": format!("cs_{id}"),
            "mode": "payment",
            "payment_status": "paid",
            "amount_total": amount,
            "payment_intent": payment_intent,
            "metadata": { "user_id": user_id.to_string(), "type": "credits" }
        }),
    )
}

pub fn subscription_checkout(id: &str, user_id: &UserId, subscription_id: &str) -> Value {
    event(
        id,
        "checkout.session.completed",
        Utc::now().timestamp(),
        json!({
            "id": format!("cs_{id}"),
            "mode": "subscription",
            "payment_status": "paid",
            "subscription": subscription_id,
            "client_reference_id": user_id.to_string(),
            "metadata": { "user_id": user_id.to_string(), "type": "subscription" }
        }),
    )
}

pub fn subscription_object(
    subscription_id: &str,
    user_id: &UserId,
    status: &str,
    price_id: &str,
) -> Value {
    json!({
        "id": subscription_id,
        "customer": "cus_test",
        "status": status,
        "current_period_start": 1_700_000_000,
        "current_period_end": 1_702_592_000,
        "metadata": { "user_id": user_id.to_string() },
        "items": { "data": [ { "price": { "id": price_id } } ], "has_more": false }
    })
}
