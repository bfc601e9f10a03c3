//! Application state.

use std::sync::Arc;

use tally_store::Store;

use crate::ai::{ChatModel, OpenAiClient};
use crate::config::ServiceConfig;
use crate::engine::CreditEngine;
use crate::metering::UsageMeter;
use crate::processor::WebhookProcessor;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Stripe client (optional).
    pub stripe: Option<Arc<StripeClient>>,

    /// Credit engine over `store`.
    pub engine: CreditEngine,

    /// Billing webhook processor.
    pub processor: WebhookProcessor,

    /// Assistant usage meter.
    pub meter: UsageMeter,
}

impl AppState {
    /// Create the state, building provider clients from `config`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let chat = config.openai_api_key.as_ref().and_then(|key| {
            match OpenAiClient::new(key, &config.openai_base_url, &config.openai_model) {
                Ok(client) => {
                    tracing::info!(model = %config.openai_model, "OpenAI integration enabled");
                    Some(Arc::new(client) as Arc<dyn ChatModel>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create OpenAI client");
                    None
                }
            }
        });

        if chat.is_none() {
            tracing::warn!("OpenAI not configured - assistant requests will fail");
        }

        Self::with_chat_model(store, config, chat)
    }

    /// Create the state with an explicit chat model instead of the configured one.
    #[must_use]
    pub fn with_chat_model(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        chat: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key, &config.stripe_base_url) {
                Ok(client) => {
                    tracing::info!("Stripe integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - checkout and subscription lookups unavailable");
        }
        if config.stripe_webhook_secret.is_none() {
            tracing::warn!("Stripe webhook secret not configured - webhooks will be rejected");
        }

        let processor = WebhookProcessor::new(
            Arc::clone(&store),
            stripe.clone(),
            config.pricing.clone(),
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance_seconds,
        );

        Self {
            engine: CreditEngine::new(Arc::clone(&store)),
            meter: UsageMeter::new(Arc::clone(&store), chat),
            processor,
            store,
            config,
            stripe,
        }
    }
}
