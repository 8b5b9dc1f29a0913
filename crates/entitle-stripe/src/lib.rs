//! # entitle-stripe
//!
//! Stripe integration for entitle-rs.
//!
//! This crate provides the Stripe side of the webhook pipeline:
//!
//! 1. **signature** - `Stripe-Signature` verification over the raw body
//!    - HMAC-SHA256, constant-time comparison
//!    - Freshness window against replayed deliveries
//!
//! 2. **webhook** - decoding verified payloads into `entitle_core::TypedEvent`
//!    - `checkout.session.completed` and `customer.subscription.deleted`
//!    - Everything else is acknowledged and ignored
//!
//! 3. **billing** - subscription lookup used to add a renewal date to
//!    confirmation messages
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! use entitle_stripe::{webhook, StripeConfig, StripeWebhookVerifier};
//! use std::sync::Arc;
//!
//! let config = Arc::new(StripeConfig::from_env()?);
//! let verifier = StripeWebhookVerifier::new(config.clone());
//!
//! // In your webhook endpoint:
//! let verified = verifier.verify(&body, signature_header)?;
//! let event = webhook::decode(&verified)?;
//! let execution = executor.execute(&event).await?;
//! ```

pub mod billing;
pub mod config;
pub mod signature;
pub mod webhook;

// Re-exports
pub use billing::StripeBillingClient;
pub use config::{ConfigError, StripeConfig};
pub use signature::{verify, StripeWebhookVerifier, VerifiedEvent, SIGNATURE_HEADER};
#[cfg(any(test, feature = "test-util"))]
pub use signature::generate_test_header;
pub use webhook::{decode, REQUIRED_WEBHOOK_EVENTS};
