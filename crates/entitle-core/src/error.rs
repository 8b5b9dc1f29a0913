//! # Error Types
//!
//! Typed errors for each stage of webhook processing.
//! The stage an error comes from decides how the payment processor is
//! answered, so every variant maps onto an HTTP status through
//! [`WebhookError::status_code`].

use crate::entitlement::UserId;
use thiserror::Error;

/// The inbound event could not be authenticated
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    /// No signature header on the request
    #[error("Missing signature header")]
    MissingHeader,

    /// Header present but not in `t=...,v1=...` form
    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),

    /// Signed timestamp is outside the freshness window
    #[error("Timestamp outside tolerance ({age_secs}s old, tolerance {tolerance_secs}s)")]
    StaleTimestamp { age_secs: i64, tolerance_secs: i64 },

    /// None of the supplied signatures match the payload
    #[error("Signature mismatch")]
    SignatureMismatch,
}

/// A verified payload could not be turned into a typed event
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not a well-formed event envelope
    #[error("Malformed event payload: {0}")]
    Malformed(String),

    /// A handled event kind is missing a field it cannot be processed without
    #[error("Event {kind} is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// The event is authentic and well-formed but cannot be tied to a user
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Correlation id is empty, non-numeric or out of range
    #[error("Invalid correlation id: {0:?}")]
    InvalidCorrelationId(String),

    /// Correlation id parsed but no such user exists
    #[error("No user with id {0}")]
    UnknownUser(UserId),
}

/// Durable store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected or failed the operation
    #[error("Database error: {0}")]
    Database(String),

    /// The backing database could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Best-effort notification failure
#[derive(Debug, Error)]
pub enum NotifyError {
    /// User record vanished between the write and the notification
    #[error("No contact details for user {0}")]
    MissingContact(UserId),

    /// Contact lookup failed
    #[error("Contact lookup failed: {0}")]
    Lookup(#[from] StoreError),

    /// Network error talking to the mail or billing API
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote API answered with a non-success status
    #[error("Rejected by {service} (HTTP {status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },
}

/// Umbrella error for the webhook boundary
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// Returns true if the processor should redeliver the event
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Store(_))
    }

    /// Returns the HTTP status code to answer the processor with.
    ///
    /// Unresolvable events are acknowledged with 200 so the processor
    /// stops redelivering something that can never succeed.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::Authentication(_) => 400,
            WebhookError::Decode(_) => 400,
            WebhookError::Reconcile(_) => 200,
            WebhookError::Store(_) => 500,
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            WebhookError::from(AuthenticationError::SignatureMismatch).status_code(),
            400
        );
        assert_eq!(
            WebhookError::from(DecodeError::Malformed("eof".into())).status_code(),
            400
        );
        assert_eq!(
            WebhookError::from(ReconcileError::InvalidCorrelationId(String::new())).status_code(),
            200
        );
        assert_eq!(
            WebhookError::from(StoreError::Unavailable("pool timed out".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_only_store_errors_are_retryable() {
        assert!(WebhookError::from(StoreError::Database("deadlock".into())).is_retryable());
        assert!(!WebhookError::from(AuthenticationError::MissingHeader).is_retryable());
        assert!(!WebhookError::from(ReconcileError::UnknownUser(UserId(7))).is_retryable());
    }

    #[test]
    fn test_decode_error_names_field() {
        let err = DecodeError::MissingField {
            kind: "checkout.session.completed",
            field: "client_reference_id",
        };
        assert_eq!(
            err.to_string(),
            "Event checkout.session.completed is missing required field `client_reference_id`"
        );
    }
}
