//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use tally_core::{PricingTable, RenewalPolicy};

/// Default Stripe API base URL.
pub const DEFAULT_STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

/// Default `OpenAI` API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

/// Default accepted clock skew for webhook signatures.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECONDS: u64 = 300;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/tally").
    pub data_dir: String,

    /// Stripe secret API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (optional; webhooks are rejected without it).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL.
    pub stripe_base_url: String,

    /// `OpenAI` API key (optional; the assistant answers 502 without it).
    pub openai_api_key: Option<String>,

    /// `OpenAI` API base URL.
    pub openai_base_url: String,

    /// Chat model name.
    pub openai_model: String,

    /// Admin key for `/v1/accounts` (optional; admin routes answer 401 without it).
    pub admin_api_key: Option<String>,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Accepted age of a webhook signature timestamp, in seconds.
    pub webhook_tolerance_seconds: u64,

    /// Credit pricing.
    pub pricing: PricingTable,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// `OpenAI` secrets file structure.
#[derive(Debug, Deserialize)]
struct OpenAiSecrets {
    api_key: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Secrets files win over environment variables
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();
        let openai_api_key = load_openai_secrets();
        let defaults = Self::default();

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_base_url: env_or("STRIPE_API_BASE_URL", defaults.stripe_base_url),
            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", defaults.openai_base_url),
            openai_model: env_or("OPENAI_MODEL", defaults.openai_model),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            frontend_url: env_or("FRONTEND_URL", defaults.frontend_url),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            webhook_tolerance_seconds: env_parse("WEBHOOK_TOLERANCE_SECONDS")
                .unwrap_or(defaults.webhook_tolerance_seconds),
            pricing: load_pricing(),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Build the pricing table from `SUBSCRIPTION_CREDIT_POLICY` and
/// `SUBSCRIPTION_MONTHLY_CREDITS`.
fn load_pricing() -> PricingTable {
    let mut pricing = PricingTable::default();

    if let Ok(raw) = std::env::var("SUBSCRIPTION_CREDIT_POLICY") {
        match raw.parse::<RenewalPolicy>() {
            Ok(policy) => pricing.renewal = policy,
            Err(e) => {
                tracing::warn!(error = %e, default = %pricing.renewal, "Ignoring SUBSCRIPTION_CREDIT_POLICY");
            }
        }
    }

    if let Some(credits) = env_parse::<i64>("SUBSCRIPTION_MONTHLY_CREDITS").filter(|c| *c >= 0) {
        pricing.default_monthly_credits = credits;
    }

    pricing
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load the `OpenAI` key from file or environment.
fn load_openai_secrets() -> Option<String> {
    let secret_paths = [".secrets/openai.json", "../.secrets/openai.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<OpenAiSecrets>(path) {
            tracing::info!(path = %path, "Loaded OpenAI secrets from file");
            return Some(secrets.api_key);
        }
    }

    tracing::debug!("OpenAI secrets file not found, using environment variables");
    std::env::var("OPENAI_API_KEY").ok()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/tally".into(),
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_base_url: DEFAULT_STRIPE_BASE_URL.into(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            openai_model: DEFAULT_OPENAI_MODEL.into(),
            admin_api_key: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            webhook_tolerance_seconds: DEFAULT_WEBHOOK_TOLERANCE_SECONDS,
            pricing: PricingTable::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_file_is_parsed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stripe.json");
        std::fs::write(&path, r#"{"api_key":"sk_test_1","webhook_secret":"whsec_1"}"#).unwrap();

        let secrets: StripeSecrets = load_secrets_file(path.to_str().unwrap()).unwrap();
        assert_eq!(secrets.api_key, "sk_test_1");
        assert_eq!(secrets.webhook_secret.as_deref(), Some("whsec_1"));
    }

    #[test]
    fn missing_secrets_file_is_not_found() {
        let err = load_secrets_file::<OpenAiSecrets>("/nonexistent/openai.json").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.webhook_tolerance_seconds, 300);
        assert_eq!(config.openai_model, "gpt-4");
        assert_eq!(config.pricing.default_monthly_credits, 100);
        assert_eq!(config.pricing.renewal, RenewalPolicy::Reset);
    }
}
