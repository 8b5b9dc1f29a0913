//! # Request Handlers
//!
//! Axum request handlers for the webhook receiver.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use entitle_core::{DecodeError, WebhookError};
use entitle_stripe::{webhook, SIGNATURE_HEADER};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let mut response = ErrorResponse::new(err.to_string(), code);
    if err.is_retryable() {
        response = response.with_details("retryable");
    }
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "entitle",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handle Stripe webhook
///
/// The response is sent once the store write is durable; the confirmation
/// message goes out afterwards on its own task.
#[instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let verified = state.verifier.verify(&body, signature).map_err(|e| {
        warn!(reason = %e, "Webhook signature rejected");
        webhook_error_to_response(e.into())
    })?;

    let event = webhook::decode(&verified).map_err(|e| {
        match &e {
            DecodeError::MissingField { kind, field } => {
                warn!(kind = %kind, field = %field, "Webhook event missing required field")
            }
            DecodeError::Malformed(_) => warn!("Webhook payload is not a Stripe event"),
        }
        webhook_error_to_response(e.into())
    })?;

    info!(
        event_id = %event.event_id(),
        kind = %event.kind(),
        signed_at = %verified.signed_at(),
        "Received webhook"
    );

    match state.executor.execute(&event).await {
        Ok(execution) => {
            if let Some(effect) = execution.side_effect {
                let executor = state.executor.clone();
                tokio::spawn(async move {
                    executor.perform_best_effort(effect).await;
                });
            }
            Ok(StatusCode::OK)
        }
        // Redelivery cannot fix a bad correlation id, so acknowledge it
        Err(WebhookError::Reconcile(e)) => {
            error!(event_id = %event.event_id(), error = %e, "Webhook event could not be reconciled");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            error!(event_id = %event.event_id(), error = %e, "Webhook processing failed");
            Err(webhook_error_to_response(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitle_core::{AuthenticationError, StoreError};

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
        assert!(err.details.is_none());
    }

    #[test]
    fn test_webhook_error_conversion() {
        let (status, _json) = webhook_error_to_response(AuthenticationError::SignatureMismatch.into());
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, Json(body)) =
            webhook_error_to_response(StoreError::Unavailable("pool timed out".into()).into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.details.as_deref(), Some("retryable"));
    }
}
