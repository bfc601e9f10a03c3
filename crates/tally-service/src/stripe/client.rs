//! Stripe API client implementation.

use reqwest::Client;
use std::time::Duration;

use tally_core::UserId;

use super::types::{CheckoutKind, CheckoutSession, StripeErrorResponse, Subscription};

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Parameters of a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    /// What is being sold.
    pub kind: CheckoutKind,
    /// Stripe price of the single line item.
    pub price_id: &'a str,
    /// The buyer.
    pub user_id: UserId,
    /// Redirect after payment.
    pub success_url: &'a str,
    /// Redirect after abandoning checkout.
    pub cancel_url: &'a str,
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API root, normally `https://api.stripe.com/v1`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, StripeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StripeError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Retrieve a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, StripeError> {
        let response = self
            .client
            .get(format!("{}/subscriptions/{subscription_id}", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Create a hosted Checkout session.
    ///
    /// The session carries `metadata[user_id]` and `metadata[type]`; for
    /// subscriptions the user id is also copied onto the subscription so later
    /// subscription events can be attributed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let user_id = request.user_id.to_string();

        let mut params = vec![
            ("mode", request.kind.mode().to_string()),
            ("success_url", request.success_url.to_string()),
            ("cancel_url", request.cancel_url.to_string()),
            ("client_reference_id", user_id.clone()),
            ("line_items[0][price]", request.price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("metadata[user_id]", user_id.clone()),
            ("metadata[type]", request.kind.as_str().to_string()),
        ];

        if request.kind == CheckoutKind::Subscription {
            params.push(("subscription_data[metadata][user_id]", user_id.clone()));
        }

        tracing::debug!(
            user_id = %user_id,
            price_id = %request.price_id,
            kind = %request.kind,
            "Creating Stripe checkout session"
        );

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        match response.json::<StripeErrorResponse>().await {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let client = StripeClient::new("sk_test_xxx", "http://localhost:1234/v1/").unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/v1");
    }
}
