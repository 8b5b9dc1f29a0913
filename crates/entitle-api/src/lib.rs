//! # entitle-api
//!
//! HTTP layer for entitle-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Stripe webhook endpoint wired to the entitlement executor
//! - PostgreSQL entitlement store (sqlx)
//! - HTTP mailer for subscription confirmations
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/webhook/stripe` | Stripe webhook |

pub mod handlers;
pub mod mailer;
pub mod routes;
pub mod state;
pub mod store;

pub use mailer::{HttpMailer, MailConfig};
pub use routes::create_router;
pub use state::{AppConfig, AppState};
pub use store::PostgresEntitlementStore;
