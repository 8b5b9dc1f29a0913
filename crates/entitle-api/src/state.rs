//! # Application State
//!
//! Shared state for the Axum application.
//! Wires the Stripe verifier, the entitlement store and the notifier
//! together from configuration.

use crate::mailer::{HttpMailer, MailConfig};
use crate::store::PostgresEntitlementStore;
use entitle_core::{
    Executor, InMemoryEntitlementStore, LoggingNotifier, SharedEntitlementStore, SharedNotifier,
};
use entitle_stripe::{StripeBillingClient, StripeConfig, StripeWebhookVerifier};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Largest webhook body accepted
pub const MAX_WEBHOOK_BODY_BYTES: usize = 64 * 1024;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// PostgreSQL connection string; in-memory store when absent outside production
    pub database_url: Option<String>,
    /// Emit logs as JSON
    pub json_logs: bool,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            json_logs: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checks `Stripe-Signature` headers
    pub verifier: StripeWebhookVerifier,
    /// Store write and side-effect dispatch
    pub executor: Executor,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Build state from configuration; Stripe and mail settings come from the environment
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let stripe = Arc::new(
            StripeConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load Stripe config: {}", e))?,
        );
        if stripe.is_test_mode() {
            info!("Stripe running in test mode");
        }

        let store = connect_store(&config).await?;
        let notifier = build_notifier(stripe.request_timeout)?;
        let billing = StripeBillingClient::new(stripe.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create Stripe client: {}", e))?;

        let executor = Executor::new(store, notifier).with_billing_lookup(Arc::new(billing));

        Ok(Self {
            verifier: StripeWebhookVerifier::new(stripe),
            executor,
            config,
        })
    }

    /// Assemble state from parts (tests and embedding)
    pub fn from_parts(verifier: StripeWebhookVerifier, executor: Executor, config: AppConfig) -> Self {
        Self {
            verifier,
            executor,
            config,
        }
    }
}

async fn connect_store(config: &AppConfig) -> anyhow::Result<SharedEntitlementStore> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresEntitlementStore::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
            info!("Using PostgreSQL entitlement store");
            Ok(Arc::new(store))
        }
        None if config.is_production() => {
            Err(anyhow::anyhow!("DATABASE_URL must be set in production"))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory entitlement store");
            Ok(Arc::new(InMemoryEntitlementStore::new()))
        }
    }
}

fn build_notifier(timeout: Duration) -> anyhow::Result<SharedNotifier> {
    let mail = MailConfig::from_env().map_err(|e| anyhow::anyhow!("Invalid mail config: {}", e))?;
    match mail {
        Some(mail) => {
            info!(api = %mail.api_url, "Sending confirmations through mail API");
            let mailer = HttpMailer::new(mail, timeout)
                .map_err(|e| anyhow::anyhow!("Failed to create mail client: {}", e))?;
            Ok(Arc::new(mailer))
        }
        None => {
            warn!("MAIL_API_KEY not set, confirmations will only be logged");
            Ok(Arc::new(LoggingNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_app_config_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert!(!config.is_production());
        assert_eq!(config.database_url, None);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_socket_addr() {
        let config = config_from(&[("HOST", "0.0.0.0"), ("PORT", "3000"), ("LOG_FORMAT", "JSON")]);
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");
        assert!(config.json_logs);

        let bad = config_from(&[("HOST", "not a host")]);
        assert!(bad.socket_addr().is_err());
    }

    #[tokio::test]
    async fn test_production_requires_database() {
        let config = config_from(&[("ENVIRONMENT", "production")]);
        assert!(connect_store(&config).await.is_err());

        let dev = config_from(&[("DATABASE_URL", "")]);
        assert!(connect_store(&dev).await.is_ok());
    }
}
