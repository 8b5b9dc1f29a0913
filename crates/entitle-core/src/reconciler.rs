//! # Reconciler
//!
//! Pure state transitions from a typed event and the current entitlement to
//! the mutation that should be written and the side effect that should
//! follow it. Nothing in here touches the store or the network.
//!
//! ```text
//!                 ActivationCompleted
//!   Unsubscribed ─────────────────────▶ Subscribed ──┐
//!        ▲  │                              │   ▲      │ ActivationCompleted
//!        │  └──────────────┐    ┌──────────┘   └──────┘ (no confirmation)
//!        │  Cancelled      │    │ SubscriptionCancelled
//!        └─────────────────┘◀───┘
//! ```

use crate::entitlement::{EntitlementKey, EntitlementMutation, EntitlementRecord, SubscriptionState, UserId};
use crate::error::ReconcileError;
use crate::event::{Money, TypedEvent};

/// Follow-up work after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    SendConfirmation {
        user_id: UserId,
        subscription_ref: String,
        amount: Option<Money>,
    },
}

/// Informational outcome, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    /// The mutation moves the record to a new state
    Transition,
    /// The record already reflects this event
    AlreadyApplied,
    /// Cancellation for a customer we have no record of
    NoMatchingRecord,
    /// Event kind we do not act on
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub mutation: EntitlementMutation,
    /// Only valid if the store reports the mutation applied
    pub side_effect: Option<SideEffect>,
    pub note: Note,
}

impl Reconciliation {
    fn unchanged(note: Note) -> Self {
        Self {
            mutation: EntitlementMutation::Unchanged,
            side_effect: None,
            note,
        }
    }
}

/// Parse the checkout correlation id into a user id
pub fn parse_correlation_id(raw: &str) -> Result<UserId, ReconcileError> {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(id) if id > 0 => Ok(UserId(id)),
        _ => Err(ReconcileError::InvalidCorrelationId(raw.to_string())),
    }
}

/// Work out which record an event refers to.
///
/// Returns `Ok(None)` for events that do not touch any record.
pub fn resolve(event: &TypedEvent) -> Result<Option<EntitlementKey>, ReconcileError> {
    match event {
        TypedEvent::ActivationCompleted { correlation_id, .. } => {
            parse_correlation_id(correlation_id).map(|id| Some(EntitlementKey::User(id)))
        }
        TypedEvent::SubscriptionCancelled { customer_ref, .. } => {
            Ok(Some(EntitlementKey::Customer(customer_ref.clone())))
        }
        TypedEvent::Ignored { .. } => Ok(None),
    }
}

/// Decide what an event does to the current entitlement.
///
/// `current` is the record found under the key from [`resolve`], or `None`
/// when the store had no such record.
pub fn reconcile(
    event: &TypedEvent,
    current: Option<&EntitlementRecord>,
) -> Result<Reconciliation, ReconcileError> {
    match event {
        TypedEvent::ActivationCompleted {
            correlation_id,
            customer_ref,
            subscription_ref,
            amount,
            ..
        } => {
            let user_id = parse_correlation_id(correlation_id)?;
            let record = current
                .filter(|r| r.user_id == user_id)
                .ok_or(ReconcileError::UnknownUser(user_id))?;

            if record.is_subscribed
                && record.customer_ref.as_deref() == Some(customer_ref.as_str())
                && record.subscription_ref.as_deref() == Some(subscription_ref.as_str())
            {
                return Ok(Reconciliation::unchanged(Note::AlreadyApplied));
            }

            // Confirmation belongs to the Unsubscribed -> Subscribed edge only.
            // A legacy grant or a replaced subscription gets its refs
            // updated without a second thank-you.
            let first_activation = record.state() == SubscriptionState::Unsubscribed;
            let side_effect = first_activation.then(|| SideEffect::SendConfirmation {
                user_id,
                subscription_ref: subscription_ref.clone(),
                amount: amount.clone(),
            });

            Ok(Reconciliation {
                mutation: EntitlementMutation::Activate {
                    user_id,
                    customer_ref: customer_ref.clone(),
                    subscription_ref: subscription_ref.clone(),
                    require_unsubscribed: first_activation,
                },
                side_effect,
                note: Note::Transition,
            })
        }

        TypedEvent::SubscriptionCancelled { customer_ref, .. } => {
            let Some(record) = current else {
                return Ok(Reconciliation::unchanged(Note::NoMatchingRecord));
            };

            if !record.is_subscribed && record.subscription_ref.is_none() {
                return Ok(Reconciliation::unchanged(Note::AlreadyApplied));
            }

            Ok(Reconciliation {
                mutation: EntitlementMutation::Deactivate {
                    customer_ref: customer_ref.clone(),
                },
                side_effect: None,
                note: Note::Transition,
            })
        }

        TypedEvent::Ignored { .. } => Ok(Reconciliation::unchanged(Note::Ignored)),
    }
}
