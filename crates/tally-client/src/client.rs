//! Tally HTTP client implementation.

use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use tally_core::UserId;

use crate::error::ClientError;
use crate::types::{
    Account, ApiErrorResponse, CheckoutRequest, CheckoutResponse, MessageRequest, MessageResponse,
    TransactionList,
};

/// Tally API client.
#[derive(Debug, Clone)]
pub struct TallyClient {
    client: Client,
    base_url: String,
    admin_key: Option<String>,
}

impl TallyClient {
    /// Create a client for `base_url` (e.g. `"http://tally:8080"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key: options.admin_key,
        })
    }

    /// Send one assistant message, paying one credit.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredits`] when the user has no
    /// credits, [`ClientError::NotFound`] for an unknown user or conversation,
    /// and [`ClientError::Api`] for anything else the service rejects.
    pub async fn send_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ClientError> {
        let url = format!("{}/assistant/message", self.base_url);
        tracing::debug!(user_id = %request.user_id, "Sending assistant message");

        let response = self.client.post(&url).json(request).send().await?;
        Self::handle_response(response).await
    }

    /// Start a hosted checkout and return its URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service rejects it.
    pub async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResponse, ClientError> {
        let url = format!("{}/billing/checkout", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;
        Self::handle_response(response).await
    }

    /// Provision a ledger for `user_id` (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if no admin key is configured, the request fails or
    /// the ledger already exists.
    pub async fn create_account(&self, user_id: &UserId) -> Result<Account, ClientError> {
        let url = format!("{}/v1/accounts", self.base_url);
        let request = self
            .admin(self.client.post(&url))?
            .json(&serde_json::json!({ "user_id": user_id.to_string() }));

        Self::handle_response(request.send().await?).await
    }

    /// Read a ledger (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if no admin key is configured or the request fails.
    pub async fn get_account(&self, user_id: &UserId) -> Result<Account, ClientError> {
        let url = format!("{}/v1/accounts/{user_id}", self.base_url);
        let request = self.admin(self.client.get(&url))?;

        Self::handle_response(request.send().await?).await
    }

    /// List a ledger's credit transactions, newest first (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if no admin key is configured or the request fails.
    pub async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionList, ClientError> {
        let url = format!("{}/v1/accounts/{user_id}/transactions", self.base_url);
        let request = self
            .admin(self.client.get(&url))?
            .query(&[("limit", limit), ("offset", offset)]);

        Self::handle_response(request.send().await?).await
    }

    fn admin(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let key = self
            .admin_key
            .as_deref()
            .ok_or_else(|| ClientError::Configuration("admin key not configured".into()))?;
        Ok(request.header("x-admin-key", key))
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let Ok(body) = response.json::<ApiErrorResponse>().await else {
            return Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            });
        };

        match body.code.as_deref() {
            Some("insufficient_credits") => Err(ClientError::InsufficientCredits),
            Some("not_found") => Err(ClientError::NotFound(body.error)),
            Some("unauthorized") => Err(ClientError::Unauthorized),
            code => Err(ClientError::Api {
                code: code.unwrap_or("unknown").to_string(),
                message: body.error,
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 90, an assistant reply can be slow).
    pub timeout_seconds: u64,
    /// Admin key for the account endpoints.
    pub admin_key: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 90,
            admin_key: None,
        }
    }
}

impl ClientOptions {
    /// Options carrying an admin key.
    #[must_use]
    pub fn with_admin_key(key: impl Into<String>) -> Self {
        Self {
            admin_key: Some(key.into()),
            ..Self::default()
        }
    }
}
