//! # Webhook Signature Verification
//!
//! Stripe signs each delivery with HMAC-SHA256 over `"{t}.{body}"` and sends
//! the result in the `Stripe-Signature` header:
//!
//! ```text
//! Stripe-Signature: t=1736294400,v1=5257a869e7ec...,v1=9f2c...
//! ```
//!
//! Several `v1` entries appear while a secret is being rolled; any one of
//! them matching is enough. Verification runs on the exact wire bytes, so it
//! must happen before the body is parsed.

use crate::config::StripeConfig;
use chrono::{DateTime, Utc};
use entitle_core::AuthenticationError;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::instrument;

type HmacSha256 = Hmac<Sha256>;

/// Header Stripe puts the signature in
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// A payload whose signature and timestamp have been checked.
///
/// Only [`verify`] hands these out, so holding one means the bytes came
/// from Stripe.
#[derive(Debug, Clone)]
pub struct VerifiedEvent {
    payload: Vec<u8>,
    signed_at: DateTime<Utc>,
}

impl VerifiedEvent {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn signed_at(&self) -> DateTime<Utc> {
        self.signed_at
    }

    #[cfg(test)]
    pub(crate) fn assume_verified(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            signed_at: Utc::now(),
        }
    }
}

/// Verify a delivery against the signing secret, as of now
pub fn verify(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance: Duration,
) -> Result<VerifiedEvent, AuthenticationError> {
    verify_at(payload, signature_header, secret, tolerance, Utc::now())
}

/// Verify a delivery against the signing secret, as of `now`
pub fn verify_at(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<VerifiedEvent, AuthenticationError> {
    let header = SignatureHeader::parse(signature_header)?;

    // `t` is attacker-controlled; saturate instead of overflowing
    let age_secs = now.timestamp().saturating_sub(header.timestamp);
    let tolerance_secs = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
    if age_secs.unsigned_abs() > tolerance_secs.unsigned_abs() {
        return Err(AuthenticationError::StaleTimestamp {
            age_secs,
            tolerance_secs,
        });
    }

    let expected = compute_signature(secret, header.timestamp, payload)?;

    let valid = header
        .signatures
        .iter()
        .any(|sig| bool::from(expected.as_slice().ct_eq(sig.as_slice())));

    if !valid {
        return Err(AuthenticationError::SignatureMismatch);
    }

    let signed_at = DateTime::from_timestamp(header.timestamp, 0).ok_or_else(|| {
        AuthenticationError::MalformedHeader("timestamp out of range".to_string())
    })?;

    Ok(VerifiedEvent {
        payload: payload.to_vec(),
        signed_at,
    })
}

/// Verifier bound to one configured signing secret
#[derive(Clone)]
pub struct StripeWebhookVerifier {
    config: Arc<StripeConfig>,
}

impl StripeWebhookVerifier {
    pub fn new(config: Arc<StripeConfig>) -> Self {
        Self { config }
    }

    /// Verify a delivery; the header is `None` when the request had none
    #[instrument(skip_all)]
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<VerifiedEvent, AuthenticationError> {
        let header = signature_header.ok_or(AuthenticationError::MissingHeader)?;
        verify(
            payload,
            header,
            self.config.webhook_secret.expose_secret(),
            self.config.webhook_tolerance,
        )
    }
}

/// Build a `Stripe-Signature` header for a payload, as Stripe would send it.
///
/// Test fixtures only; enabled for dependents through the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
pub fn generate_test_header(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, AuthenticationError> {
    let sig = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(sig)))
}

#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parse `t=<unix>,v1=<hex>[,v1=<hex>…]`; other schemes are ignored
    fn parse(header: &str) -> Result<Self, AuthenticationError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        AuthenticationError::MalformedHeader("invalid timestamp".to_string())
                    })?);
                }
                // A v1 entry that is not hex cannot match anything
                "v1" => {
                    if let Ok(sig) = hex::decode(value) {
                        signatures.push(sig);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            AuthenticationError::MalformedHeader("missing timestamp".to_string())
        })?;

        if signatures.is_empty() {
            return Err(AuthenticationError::MalformedHeader(
                "no v1 signature found".to_string(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<Vec<u8>, AuthenticationError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthenticationError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}
