//! # Routes
//!
//! Axum router configuration for the webhook receiver.

use crate::handlers;
use crate::state::{AppState, MAX_WEBHOOK_BODY_BYTES};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Create the main application router
///
/// Routes:
/// - GET  /health - Liveness probe
/// - POST /webhook/stripe - Stripe webhook handler (raw body, 64 KiB max)
pub fn create_router(state: AppState) -> Router {
    // Webhook routes (must accept raw body)
    let webhook_routes = Router::new()
        .route("/stripe", post(handlers::stripe_webhook))
        .layer(RequestBodyLimitLayer::new(MAX_WEBHOOK_BODY_BYTES));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/webhook", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
