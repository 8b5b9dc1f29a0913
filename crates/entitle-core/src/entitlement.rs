//! # Entitlement Types
//!
//! The subscription facet of a user record and the mutations that can be
//! applied to it.

use std::fmt;

/// Internal user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription state of a user as seen by the rest of the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRecord {
    /// Primary key in the user store
    pub user_id: UserId,

    /// The sole authorization signal for subscriber-only features
    pub is_subscribed: bool,

    /// Customer id at the payment processor. Never cleared once set.
    pub customer_ref: Option<String>,

    /// Active subscription id, cleared on cancellation
    pub subscription_ref: Option<String>,
}

impl EntitlementRecord {
    /// A user who has never subscribed
    pub fn unsubscribed(user_id: UserId) -> Self {
        Self {
            user_id,
            is_subscribed: false,
            customer_ref: None,
            subscription_ref: None,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        if self.is_subscribed {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::Unsubscribed
        }
    }

    /// Subscribed without a subscription reference.
    ///
    /// Users granted access by hand before processor integration existed
    /// are in this state; it is tolerated, not repaired.
    pub fn is_legacy_grant(&self) -> bool {
        self.is_subscribed && self.subscription_ref.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed,
}

/// Who to address a confirmation to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContact {
    pub email: String,
    pub display_name: String,
}

impl UserContact {
    /// Build a contact, preferring the full name over the username
    pub fn new(email: impl Into<String>, username: &str, full_name: Option<&str>) -> Self {
        let display_name = full_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(username)
            .to_string();
        Self {
            email: email.into(),
            display_name,
        }
    }
}

/// How an event locates its entitlement record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntitlementKey {
    /// Activation events carry the internal user id set at checkout
    User(UserId),
    /// Cancellation events only carry the processor's customer id
    Customer(String),
}

impl fmt::Display for EntitlementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitlementKey::User(id) => write!(f, "user:{}", id),
            EntitlementKey::Customer(c) => write!(f, "customer:{}", c),
        }
    }
}

/// A single atomic write against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementMutation {
    /// Nothing to write
    Unchanged,

    /// Set subscribed and record processor refs for a user
    Activate {
        user_id: UserId,
        customer_ref: String,
        subscription_ref: String,
        /// Only apply while the row is still unsubscribed
        require_unsubscribed: bool,
    },

    /// Clear subscribed and the subscription ref for every user with this customer ref
    Deactivate { customer_ref: String },
}

impl EntitlementMutation {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, EntitlementMutation::Unchanged)
    }

    /// Apply this mutation to an in-memory record.
    ///
    /// Returns false when the record is not targeted or a guard rejects it.
    pub fn apply_to(&self, record: &mut EntitlementRecord) -> bool {
        match self {
            EntitlementMutation::Unchanged => false,
            EntitlementMutation::Activate {
                user_id,
                customer_ref,
                subscription_ref,
                require_unsubscribed,
            } => {
                if record.user_id != *user_id || (*require_unsubscribed && record.is_subscribed) {
                    return false;
                }
                record.is_subscribed = true;
                record.customer_ref = Some(customer_ref.clone());
                record.subscription_ref = Some(subscription_ref.clone());
                true
            }
            EntitlementMutation::Deactivate { customer_ref } => {
                if record.customer_ref.as_deref() != Some(customer_ref.as_str()) {
                    return false;
                }
                record.is_subscribed = false;
                record.subscription_ref = None;
                true
            }
        }
    }
}

/// What the store reports after applying a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { rows: u64 },
    /// Expected and non-fatal: record deleted, guard lost, or nothing to do
    NoRowsAffected,
}

impl ApplyOutcome {
    pub fn from_rows(rows: u64) -> Self {
        if rows == 0 {
            ApplyOutcome::NoRowsAffected
        } else {
            ApplyOutcome::Applied { rows }
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}
