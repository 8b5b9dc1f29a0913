//! # Stripe Configuration
//!
//! Configuration management for the Stripe integration.
//! All secrets are loaded from environment variables and held as
//! [`SecretString`] so they never end up in debug output or logs.

use secrecy::{ExposeSecret, SecretString};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default freshness window for signed webhook timestamps
pub const DEFAULT_WEBHOOK_TOLERANCE: Duration = Duration::from_secs(300);

/// Default deadline for outbound calls to the Stripe API
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_API_VERSION: &str = "2024-12-18.acacia";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{var} {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Stripe API configuration
#[derive(Debug)]
pub struct StripeConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub secret_key: SecretString,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: SecretString,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,

    /// Maximum distance between a webhook's signed timestamp and now
    pub webhook_tolerance: Duration,

    /// Deadline for each outbound API request
    pub request_timeout: Duration,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `STRIPE_SECRET_KEY`
    /// - `STRIPE_WEBHOOK_SECRET`
    ///
    /// Optional:
    /// - `STRIPE_API_BASE_URL`
    /// - `STRIPE_WEBHOOK_TOLERANCE_SECS` (default 300)
    /// - `OUTBOUND_TIMEOUT_SECS` (default 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret_key = lookup("STRIPE_SECRET_KEY").ok_or(ConfigError::Missing("STRIPE_SECRET_KEY"))?;
        let webhook_secret =
            lookup("STRIPE_WEBHOOK_SECRET").ok_or(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?;

        // Validate key formats
        if !secret_key.starts_with("sk_test_") && !secret_key.starts_with("sk_live_") {
            return Err(ConfigError::Invalid {
                var: "STRIPE_SECRET_KEY",
                reason: "must start with sk_test_ or sk_live_".to_string(),
            });
        }

        if !webhook_secret.starts_with("whsec_") {
            return Err(ConfigError::Invalid {
                var: "STRIPE_WEBHOOK_SECRET",
                reason: "must start with whsec_".to_string(),
            });
        }

        let mut config = Self::new(secret_key, webhook_secret);

        if let Some(url) = lookup("STRIPE_API_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            config.webhook_tolerance = parse_secs("STRIPE_WEBHOOK_TOLERANCE_SECS", &secs)?;
        }
        if let Some(secs) = lookup("OUTBOUND_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("OUTBOUND_TIMEOUT_SECS", &secs)?;
        }

        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret(secret_key.into()),
            webhook_secret: secret(webhook_secret.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            webhook_tolerance: DEFAULT_WEBHOOK_TOLERANCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.expose_secret().starts_with("sk_test_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key.expose_secret())
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

fn secret(value: String) -> SecretString {
    SecretString::new(value.into_boxed_str())
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("must be a whole number of seconds, got {:?}", value),
        })
}
