//! # Executor
//!
//! Runs a decoded event through the reconciler, writes the resulting
//! mutation, and hands back any side effect that the write made valid.
//!
//! Side effects are returned instead of performed so the caller can answer
//! the payment processor as soon as the write is durable and send the
//! confirmation afterwards.

use crate::entitlement::{ApplyOutcome, EntitlementKey};
use crate::error::{NotifyError, WebhookError};
use crate::event::{EventKind, TypedEvent};
use crate::notifier::{ConfirmationMessage, SharedBillingLookup, SharedNotifier};
use crate::reconciler::{self, Note, SideEffect};
use crate::store::SharedEntitlementStore;
use tracing::{debug, error, info, instrument, warn};

/// Result of executing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub event_id: String,
    pub kind: EventKind,
    pub outcome: ExecutionOutcome,
    /// Present only when the store confirmed the transition it depends on
    pub side_effect: Option<SideEffect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Nothing was written
    Unchanged(Note),
    /// A mutation was sent to the store
    Written(ApplyOutcome),
}

/// Store write followed by side-effect dispatch
#[derive(Clone)]
pub struct Executor {
    store: SharedEntitlementStore,
    notifier: SharedNotifier,
    billing: Option<SharedBillingLookup>,
}

impl Executor {
    pub fn new(store: SharedEntitlementStore, notifier: SharedNotifier) -> Self {
        Self {
            store,
            notifier,
            billing: None,
        }
    }

    /// Builder: enrich confirmations with the processor's renewal date
    pub fn with_billing_lookup(mut self, billing: SharedBillingLookup) -> Self {
        self.billing = Some(billing);
        self
    }

    /// Reconcile and write one event.
    ///
    /// # Errors
    /// - `WebhookError::Reconcile` when the event cannot be tied to a user
    /// - `WebhookError::Store` when a read or the write fails
    #[instrument(skip(self, event), fields(event_id = %event.event_id(), kind = %event.kind()))]
    pub async fn execute(&self, event: &TypedEvent) -> Result<Execution, WebhookError> {
        let key = reconciler::resolve(event)?;

        let current = match &key {
            None => None,
            Some(EntitlementKey::User(user_id)) => self.store.find_by_user(*user_id).await?,
            Some(EntitlementKey::Customer(customer_ref)) => {
                self.store.find_by_customer_ref(customer_ref).await?
            }
        };

        let plan = reconciler::reconcile(event, current.as_ref())?;

        let execution = |outcome, side_effect| Execution {
            event_id: event.event_id().to_string(),
            kind: event.kind(),
            outcome,
            side_effect,
        };

        if plan.mutation.is_unchanged() {
            match (plan.note, &key) {
                (Note::NoMatchingRecord, Some(key)) => {
                    warn!(%key, "No user matches event, nothing to update")
                }
                (Note::AlreadyApplied, Some(key)) => {
                    info!(%key, "Entitlement already reflects event")
                }
                _ => debug!("Event requires no entitlement change"),
            }
            return Ok(execution(ExecutionOutcome::Unchanged(plan.note), None));
        }

        let applied = self.store.apply(&plan.mutation).await?;

        if let Some(key) = &key {
            match (event, applied) {
                (TypedEvent::ActivationCompleted { .. }, ApplyOutcome::Applied { .. }) => {
                    info!(%key, "User subscription activated")
                }
                (
                    TypedEvent::SubscriptionCancelled {
                        subscription_ref, ..
                    },
                    ApplyOutcome::Applied { rows },
                ) => {
                    info!(%key, rows, subscription_ref = ?subscription_ref, "User subscription deactivated")
                }
                (_, ApplyOutcome::NoRowsAffected) => {
                    info!(%key, "Update affected no rows")
                }
                _ => {}
            }
        }

        let side_effect = if applied.applied() {
            plan.side_effect
        } else {
            None
        };

        Ok(execution(ExecutionOutcome::Written(applied), side_effect))
    }

    /// Carry out a side effect and return the message that was sent.
    ///
    /// A failed billing lookup only drops the renewal date.
    pub async fn perform(&self, effect: SideEffect) -> Result<ConfirmationMessage, NotifyError> {
        match effect {
            SideEffect::SendConfirmation {
                user_id,
                subscription_ref,
                amount,
            } => {
                let contact = self
                    .store
                    .contact(user_id)
                    .await?
                    .ok_or(NotifyError::MissingContact(user_id))?;

                let renewal_date = match &self.billing {
                    Some(billing) => match billing.renewal_date(&subscription_ref).await {
                        Ok(date) => date,
                        Err(e) => {
                            warn!(
                                %user_id,
                                subscription_ref = %subscription_ref,
                                error = %e,
                                "Failed to fetch renewal date, sending confirmation without it"
                            );
                            None
                        }
                    },
                    None => None,
                };

                let message = ConfirmationMessage {
                    recipient: contact.email,
                    display_name: contact.display_name,
                    renewal_date,
                    amount: amount.and_then(|m| m.display()),
                };

                self.notifier.send_confirmation(&message).await?;
                info!(%user_id, "Subscription confirmation sent");
                Ok(message)
            }
        }
    }

    /// [`perform`](Self::perform), logging instead of returning failures
    pub async fn perform_best_effort(&self, effect: SideEffect) {
        let SideEffect::SendConfirmation { user_id, .. } = &effect;
        let user_id = *user_id;
        if let Err(e) = self.perform(effect).await {
            error!(%user_id, error = %e, "Failed to send subscription confirmation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::{EntitlementMutation, EntitlementRecord, UserContact, UserId};
    use crate::error::{ReconcileError, StoreResult};
    use crate::event::Money;
    use crate::notifier::{BillingLookup, Notifier};
    use crate::store::{EntitlementStore, InMemoryEntitlementStore};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<ConfirmationMessage>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Transport("connection refused".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FixedBilling(Result<DateTime<Utc>, ()>);

    #[async_trait]
    impl BillingLookup for FixedBilling {
        async fn renewal_date(&self, _subscription_ref: &str) -> Result<Option<DateTime<Utc>>, NotifyError> {
            match self.0 {
                Ok(date) => Ok(Some(date)),
                Err(()) => Err(NotifyError::Rejected {
                    service: "stripe",
                    status: 404,
                    message: "No such subscription".into(),
                }),
            }
        }
    }

    /// Always reports the record as it was at construction, like a reader
    /// racing a concurrent writer.
    struct StaleReads {
        inner: Arc<InMemoryEntitlementStore>,
        snapshot: EntitlementRecord,
    }

    #[async_trait]
    impl EntitlementStore for StaleReads {
        async fn find_by_user(&self, _user_id: UserId) -> StoreResult<Option<EntitlementRecord>> {
            Ok(Some(self.snapshot.clone()))
        }
        async fn find_by_customer_ref(&self, _c: &str) -> StoreResult<Option<EntitlementRecord>> {
            Ok(Some(self.snapshot.clone()))
        }
        async fn contact(&self, user_id: UserId) -> StoreResult<Option<UserContact>> {
            self.inner.contact(user_id).await
        }
        async fn apply(&self, mutation: &EntitlementMutation) -> StoreResult<ApplyOutcome> {
            self.inner.apply(mutation).await
        }
    }

    fn store_with_user_42() -> Arc<InMemoryEntitlementStore> {
        Arc::new(InMemoryEntitlementStore::new().with_user(
            EntitlementRecord::unsubscribed(UserId(42)),
            UserContact::new("ben@example.com", "ben", Some("Ben Visness")),
        ))
    }

    fn activation(correlation_id: &str) -> TypedEvent {
        TypedEvent::ActivationCompleted {
            event_id: "evt_activate".into(),
            correlation_id: correlation_id.into(),
            customer_ref: "cus_1".into(),
            subscription_ref: "sub_1".into(),
            amount: Some(Money::new(500, "usd")),
        }
    }

    fn cancellation(customer_ref: &str) -> TypedEvent {
        TypedEvent::SubscriptionCancelled {
            event_id: "evt_cancel".into(),
            customer_ref: customer_ref.into(),
            subscription_ref: Some("sub_1".into()),
        }
    }

    async fn run(executor: &Executor, event: &TypedEvent) -> Execution {
        let execution = executor.execute(event).await.unwrap();
        if let Some(effect) = execution.side_effect.clone() {
            executor.perform_best_effort(effect).await;
        }
        execution
    }

    #[tokio::test]
    async fn test_activation_then_redelivery() {
        let store = store_with_user_42();
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Executor::new(store.clone(), notifier.clone());

        let first = run(&executor, &activation("42")).await;
        assert_eq!(first.outcome, ExecutionOutcome::Written(ApplyOutcome::Applied { rows: 1 }));

        let second = run(&executor, &activation("42")).await;
        assert_eq!(second.outcome, ExecutionOutcome::Unchanged(Note::AlreadyApplied));
        assert_eq!(second.side_effect, None);

        assert_eq!(
            store.get(UserId(42)),
            Some(EntitlementRecord {
                user_id: UserId(42),
                is_subscribed: true,
                customer_ref: Some("cus_1".into()),
                subscription_ref: Some("sub_1".into()),
            })
        );
        assert_eq!(notifier.count(), 1);
        let sent = notifier.sent.lock().unwrap()[0].clone();
        assert_eq!(sent.recipient, "ben@example.com");
        assert_eq!(sent.display_name, "Ben Visness");
        assert_eq!(sent.amount.as_deref(), Some("$5.00"));
    }

    #[tokio::test]
    async fn test_racing_deliveries_confirm_once() {
        let store = store_with_user_42();
        let stale = Arc::new(StaleReads {
            inner: store.clone(),
            snapshot: EntitlementRecord::unsubscribed(UserId(42)),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Executor::new(stale, notifier.clone());

        let first = run(&executor, &activation("42")).await;
        let second = run(&executor, &activation("42")).await;

        assert!(first.side_effect.is_some());
        assert_eq!(second.outcome, ExecutionOutcome::Written(ApplyOutcome::NoRowsAffected));
        assert_eq!(second.side_effect, None);
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_keeps_customer_ref() {
        let store = store_with_user_42();
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Executor::new(store.clone(), notifier.clone());

        run(&executor, &activation("42")).await;
        let cancelled = run(&executor, &cancellation("cus_1")).await;

        assert_eq!(cancelled.side_effect, None);
        assert_eq!(
            store.get(UserId(42)),
            Some(EntitlementRecord {
                user_id: UserId(42),
                is_subscribed: false,
                customer_ref: Some("cus_1".into()),
                subscription_ref: None,
            })
        );
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_reaches_every_user_of_a_customer() {
        let store = Arc::new(
            InMemoryEntitlementStore::new()
                .with_user(
                    EntitlementRecord {
                        customer_ref: Some("cus_1".into()),
                        ..EntitlementRecord::unsubscribed(UserId(1))
                    },
                    UserContact::new("a@example.com", "a", None),
                )
                .with_user(
                    EntitlementRecord {
                        user_id: UserId(2),
                        is_subscribed: true,
                        customer_ref: Some("cus_1".into()),
                        subscription_ref: Some("sub_2".into()),
                    },
                    UserContact::new("b@example.com", "b", None),
                ),
        );
        let executor = Executor::new(store.clone(), Arc::new(RecordingNotifier::default()));

        let execution = executor.execute(&cancellation("cus_1")).await.unwrap();
        assert!(matches!(
            execution.outcome,
            ExecutionOutcome::Written(ApplyOutcome::Applied { .. })
        ));
        assert_eq!(
            store.get(UserId(2)),
            Some(EntitlementRecord {
                user_id: UserId(2),
                is_subscribed: false,
                customer_ref: Some("cus_1".into()),
                subscription_ref: None,
            })
        );
    }

    #[tokio::test]
    async fn test_cancellation_for_unknown_customer() {
        let store = store_with_user_42();
        let executor = Executor::new(store.clone(), Arc::new(RecordingNotifier::default()));

        let execution = executor.execute(&cancellation("cus_ghost")).await.unwrap();
        assert_eq!(execution.outcome, ExecutionOutcome::Unchanged(Note::NoMatchingRecord));
        assert_eq!(store.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_correlation_id_is_dropped() {
        let store = store_with_user_42();
        let executor = Executor::new(store.clone(), Arc::new(RecordingNotifier::default()));

        let err = executor.execute(&activation("")).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Reconcile(ReconcileError::InvalidCorrelationId(_))
        ));
        assert_eq!(err.status_code(), 200);
        assert_eq!(store.apply_calls(), 0);
        assert_eq!(store.get(UserId(42)), Some(EntitlementRecord::unsubscribed(UserId(42))));
    }

    #[tokio::test]
    async fn test_ignored_event_touches_nothing() {
        let store = store_with_user_42();
        let executor = Executor::new(store.clone(), Arc::new(RecordingNotifier::default()));

        let event = TypedEvent::Ignored {
            event_id: "evt_x".into(),
            kind: "invoice.paid".into(),
        };
        let execution = executor.execute(&event).await.unwrap();
        assert_eq!(execution.outcome, ExecutionOutcome::Unchanged(Note::Ignored));
        assert_eq!(store.apply_calls(), 0);
    }

    #[tokio::test]
    async fn test_renewal_date_enrichment() {
        let renews = Utc.with_ymd_and_hms(2026, 2, 8, 12, 0, 0).unwrap();
        let executor = Executor::new(store_with_user_42(), Arc::new(RecordingNotifier::default()))
            .with_billing_lookup(Arc::new(FixedBilling(Ok(renews))));

        let execution = executor.execute(&activation("42")).await.unwrap();
        let message = executor.perform(execution.side_effect.unwrap()).await.unwrap();
        assert_eq!(message.renewal_date, Some(renews));
    }

    #[tokio::test]
    async fn test_failed_enrichment_still_sends() {
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Executor::new(store_with_user_42(), notifier.clone())
            .with_billing_lookup(Arc::new(FixedBilling(Err(()))));

        let execution = executor.execute(&activation("42")).await.unwrap();
        let message = executor.perform(execution.side_effect.unwrap()).await.unwrap();
        assert_eq!(message.renewal_date, None);
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_not_fatal() {
        let store = store_with_user_42();
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let executor = Executor::new(store.clone(), notifier);

        let execution = executor.execute(&activation("42")).await.unwrap();
        let effect = execution.side_effect.unwrap();
        assert!(matches!(
            executor.perform(effect.clone()).await,
            Err(NotifyError::Transport(_))
        ));
        // Logged and swallowed
        executor.perform_best_effort(effect).await;
        assert!(store.get(UserId(42)).unwrap().is_subscribed);
    }

    #[tokio::test]
    async fn test_deleted_user_has_no_contact() {
        let store = store_with_user_42();
        let executor = Executor::new(store.clone(), Arc::new(RecordingNotifier::default()));

        let execution = executor.execute(&activation("42")).await.unwrap();
        store.remove(UserId(42)).unwrap();
        assert!(matches!(
            executor.perform(execution.side_effect.unwrap()).await,
            Err(NotifyError::MissingContact(UserId(42)))
        ));
    }
}
