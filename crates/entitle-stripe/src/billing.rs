//! # Stripe Billing Lookup
//!
//! Fetches the subscription object to find out when it next renews, so the
//! confirmation can mention the date.

use crate::config::StripeConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entitle_core::{BillingLookup, NotifyError};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, instrument};

pub struct StripeBillingClient {
    config: Arc<StripeConfig>,
    client: Client,
}

impl StripeBillingClient {
    /// Create a client whose requests are bounded by the configured timeout
    pub fn new(config: Arc<StripeConfig>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl BillingLookup for StripeBillingClient {
    #[instrument(skip(self))]
    async fn renewal_date(&self, subscription_ref: &str) -> Result<Option<DateTime<Utc>>, NotifyError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_ref
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);

            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or_else(|_| body.clone());

            return Err(NotifyError::Rejected {
                service: "stripe",
                status: status.as_u16(),
                message,
            });
        }

        let subscription: StripeSubscription = serde_json::from_str(&body).map_err(|e| {
            NotifyError::Transport(format!("Failed to parse Stripe subscription: {}", e))
        })?;

        let period_end = subscription.current_period_end();
        debug!(?period_end, "Fetched Stripe subscription");

        Ok(period_end.and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    /// Top-level on API versions before 2025-03-31
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    items: Option<StripeList<StripeSubscriptionItem>>,
}

impl StripeSubscription {
    fn current_period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.iter().find_map(|item| item.current_period_end))
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    #[serde(default)]
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}
