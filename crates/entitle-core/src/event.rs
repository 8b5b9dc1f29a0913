//! # Typed Events
//!
//! Processor-agnostic form of the inbound events the reconciler acts on.
//! Decoders in provider crates produce these from verified payloads.

use std::fmt;

/// Event kinds the system knows how to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A checkout for a subscription finished
    ActivationCompleted,
    /// The subscription was cancelled or ran out
    SubscriptionCancelled,
    /// Anything else the processor sends
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ActivationCompleted => "activation_completed",
            EventKind::SubscriptionCancelled => "subscription_cancelled",
            EventKind::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount charged, in minor units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    pub amount_minor: i64,
    /// ISO 4217 code, stored upper-case
    pub currency: String,
}

impl Money {
    pub fn new(amount_minor: i64, currency: &str) -> Self {
        Self {
            amount_minor,
            currency: currency.to_uppercase(),
        }
    }

    /// Render for a customer-facing message.
    ///
    /// Returns `None` for zero or negative totals (free trials, full discounts).
    pub fn display(&self) -> Option<String> {
        if self.amount_minor <= 0 {
            return None;
        }
        let prefix = if self.currency == "USD" {
            "$".to_string()
        } else {
            format!("{} ", self.currency)
        };
        Some(format!(
            "{}{}.{:02}",
            prefix,
            self.amount_minor / 100,
            self.amount_minor % 100
        ))
    }
}

/// Verified, decoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedEvent {
    ActivationCompleted {
        event_id: String,
        /// Raw `client_reference_id`; resolved to a user id by the reconciler
        correlation_id: String,
        customer_ref: String,
        subscription_ref: String,
        amount: Option<Money>,
    },
    SubscriptionCancelled {
        event_id: String,
        customer_ref: String,
        subscription_ref: Option<String>,
    },
    /// Authentic but not something we act on
    Ignored { event_id: String, kind: String },
}

impl TypedEvent {
    pub fn event_id(&self) -> &str {
        match self {
            TypedEvent::ActivationCompleted { event_id, .. }
            | TypedEvent::SubscriptionCancelled { event_id, .. }
            | TypedEvent::Ignored { event_id, .. } => event_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            TypedEvent::ActivationCompleted { .. } => EventKind::ActivationCompleted,
            TypedEvent::SubscriptionCancelled { .. } => EventKind::SubscriptionCancelled,
            TypedEvent::Ignored { kind, .. } => EventKind::Other(kind.clone()),
        }
    }
}
