//! # Entitlement Store
//!
//! Seam between the executor and the durable user store.
//!
//! Mutations are the only write path for the subscription flag. Each
//! `apply` call is one atomic update; "no rows affected" is a normal outcome
//! and is reported, not raised.

use crate::entitlement::{ApplyOutcome, EntitlementMutation, EntitlementRecord, UserContact, UserId};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Load the entitlement for a user id
    async fn find_by_user(&self, user_id: UserId) -> StoreResult<Option<EntitlementRecord>>;

    /// Load the entitlement for a processor customer id.
    ///
    /// Several users may share one customer id. A record that still carries
    /// a subscription is preferred over an already-cancelled one, so a
    /// cancellation is only skipped when every matching record is clear.
    async fn find_by_customer_ref(&self, customer_ref: &str) -> StoreResult<Option<EntitlementRecord>>;

    /// Load the contact details used to address a confirmation
    async fn contact(&self, user_id: UserId) -> StoreResult<Option<UserContact>>;

    /// Apply one mutation atomically
    async fn apply(&self, mutation: &EntitlementMutation) -> StoreResult<ApplyOutcome>;
}

/// Type alias for a shared store (dynamic dispatch)
pub type SharedEntitlementStore = Arc<dyn EntitlementStore>;

#[derive(Debug, Clone)]
struct StoredUser {
    record: EntitlementRecord,
    contact: UserContact,
}

/// Process-local store for tests and development.
///
/// The mutex stands in for the row lock a database takes on `UPDATE`.
#[derive(Debug, Default)]
pub struct InMemoryEntitlementStore {
    users: Mutex<BTreeMap<UserId, StoredUser>>,
    applies: AtomicUsize,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding for tests
    pub fn with_user(self, record: EntitlementRecord, contact: UserContact) -> Self {
        if let Ok(mut users) = self.users.lock() {
            users.insert(record.user_id, StoredUser { record, contact });
        }
        self
    }

    /// Remove a user, as if the account was deleted
    pub fn remove(&self, user_id: UserId) -> StoreResult<Option<EntitlementRecord>> {
        Ok(self.lock()?.remove(&user_id).map(|u| u.record))
    }

    /// Snapshot of one record
    pub fn get(&self, user_id: UserId) -> Option<EntitlementRecord> {
        self.users
            .lock()
            .ok()
            .and_then(|users| users.get(&user_id).map(|u| u.record.clone()))
    }

    /// Number of `apply` calls received, including no-op ones
    pub fn apply_calls(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<UserId, StoredUser>>> {
        self.users
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn find_by_user(&self, user_id: UserId) -> StoreResult<Option<EntitlementRecord>> {
        Ok(self.lock()?.get(&user_id).map(|u| u.record.clone()))
    }

    async fn find_by_customer_ref(&self, customer_ref: &str) -> StoreResult<Option<EntitlementRecord>> {
        Ok(self
            .lock()?
            .values()
            .filter(|u| u.record.customer_ref.as_deref() == Some(customer_ref))
            .min_by_key(|u| {
                (
                    !u.record.is_subscribed,
                    u.record.subscription_ref.is_none(),
                    u.record.user_id,
                )
            })
            .map(|u| u.record.clone()))
    }

    async fn contact(&self, user_id: UserId) -> StoreResult<Option<UserContact>> {
        Ok(self.lock()?.get(&user_id).map(|u| u.contact.clone()))
    }

    async fn apply(&self, mutation: &EntitlementMutation) -> StoreResult<ApplyOutcome> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let mut users = self.lock()?;
        let mut rows = 0u64;
        for user in users.values_mut() {
            if mutation.apply_to(&mut user.record) {
                rows += 1;
            }
        }
        Ok(ApplyOutcome::from_rows(rows))
    }
}
