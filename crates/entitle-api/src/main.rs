//! # Entitle RS
//!
//! Stripe webhook receiver that keeps user subscription entitlements in step
//! with billing events.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//! export DATABASE_URL=postgres://...
//!
//! # Run the server
//! entitle
//! ```

use entitle_api::{routes, state::AppConfig, state::AppState};
use entitle_stripe::REQUIRED_WEBHOOK_EVENTS;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    let (json, plain) = if config.json_logs {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(json)
        .with(plain)
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if !config.json_logs {
        print_banner();
    }

    // Initialize application state
    let state = AppState::new(config).await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Expected webhook events: {}", REQUIRED_WEBHOOK_EVENTS.join(", "));

    // Create router
    let app = routes::create_router(state);

    info!("Entitle starting on http://{}", addr);

    if !is_prod {
        info!("Health: GET http://{}/health", addr);
        info!("Webhook: POST http://{}/webhook/stripe", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  Entitle RS
  ━━━━━━━━━━━━━━━━━━━━━━━
  Subscription webhook receiver
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
