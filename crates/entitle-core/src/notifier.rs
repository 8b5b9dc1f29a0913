//! # Notifier
//!
//! Contract for sending the one-time subscription confirmation, plus the
//! optional billing lookup used to enrich it with a renewal date.

use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Everything a confirmation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationMessage {
    pub recipient: String,
    pub display_name: String,
    pub renewal_date: Option<DateTime<Utc>>,
    /// Pre-formatted, e.g. `$5.00` or `EUR 5.00`
    pub amount: Option<String>,
}

impl ConfirmationMessage {
    pub fn subject(&self) -> &'static str {
        "Thank you for subscribing!"
    }

    /// Plain-text body
    pub fn text_body(&self) -> String {
        let mut body = format!(
            "Hi {},\n\nThank you for subscribing! Your support means a lot.\n",
            self.display_name
        );
        if let Some(amount) = &self.amount {
            body.push_str(&format!("\nAmount charged: {}\n", amount));
        }
        if let Some(date) = self.renewal_date {
            body.push_str(&format!(
                "Your subscription renews on {}.\n",
                date.format("%B %-d, %Y")
            ));
        }
        body.push_str("\nYou can manage or cancel your subscription at any time from your account settings.\n");
        body
    }
}

/// Outbound confirmation transport
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError>;
}

/// Supplementary billing details from the payment processor
#[async_trait]
pub trait BillingLookup: Send + Sync {
    /// When the subscription next renews, if the processor reports it
    async fn renewal_date(&self, subscription_ref: &str) -> Result<Option<DateTime<Utc>>, NotifyError>;
}

pub type SharedNotifier = Arc<dyn Notifier>;
pub type SharedBillingLookup = Arc<dyn BillingLookup>;

/// Notifier that only logs (for development without a mail provider)
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError> {
        info!(
            recipient = %message.recipient,
            amount = ?message.amount,
            renewal_date = ?message.renewal_date,
            "Confirmation not sent (no mail provider configured)"
        );
        Ok(())
    }
}
