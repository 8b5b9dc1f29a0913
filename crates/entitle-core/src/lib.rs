//! # entitle-core
//!
//! Core types and logic for keeping a user's subscription entitlement in
//! step with payment processor events.
//!
//! This crate provides:
//! - `EntitlementRecord` and `EntitlementMutation` for the subscription facet of a user
//! - `TypedEvent` for processor-agnostic inbound events
//! - `reconcile` for pure event-to-mutation transitions
//! - `EntitlementStore` and `Notifier` seams for the durable store and mail transport
//! - `Executor` to write a mutation and release its side effect
//!
//! ## Example
//!
//! ```rust,ignore
//! use entitle_core::{Executor, InMemoryEntitlementStore, LoggingNotifier};
//! use std::sync::Arc;
//!
//! let executor = Executor::new(Arc::new(InMemoryEntitlementStore::new()), Arc::new(LoggingNotifier));
//!
//! // `event` comes from a provider crate's decoder
//! let execution = executor.execute(&event).await?;
//! if let Some(effect) = execution.side_effect {
//!     tokio::spawn(async move { executor.perform_best_effort(effect).await });
//! }
//! ```

pub mod entitlement;
pub mod error;
pub mod event;
pub mod executor;
pub mod notifier;
pub mod reconciler;
pub mod store;

// Re-exports for convenience
pub use entitlement::{
    ApplyOutcome, EntitlementKey, EntitlementMutation, EntitlementRecord, SubscriptionState,
    UserContact, UserId,
};
pub use error::{
    AuthenticationError, DecodeError, NotifyError, ReconcileError, StoreError, StoreResult,
    WebhookError,
};
pub use event::{EventKind, Money, TypedEvent};
pub use executor::{Execution, ExecutionOutcome, Executor};
pub use notifier::{
    BillingLookup, ConfirmationMessage, LoggingNotifier, Notifier, SharedBillingLookup,
    SharedNotifier,
};
pub use reconciler::{reconcile, resolve, Note, Reconciliation, SideEffect};
pub use store::{EntitlementStore, InMemoryEntitlementStore, SharedEntitlementStore};
