//! ReconciliationEngine - applies one notification to users, subscriptions and payments.
//!
//! All writes for a notification happen inside a single billing transaction.
//! The payment lock is taken first and the subscription lock second, in every
//! transaction, so concurrent notifications cannot deadlock.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::billing::{
    CustomerIdentity, Payment, PaymentNotification, PaymentStatus, PaymentUpdate, Subscription,
    WebhookEvent,
};
use crate::domain::foundation::{DomainError, PaymentId, SubscriptionId, Timestamp, UserId};
use crate::ports::{BillingStore, BillingTransaction, PlanCatalog};

/// What reconciliation did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Changes committed.
    Applied {
        user_id: UserId,
        payment_id: PaymentId,
        subscription_id: Option<SubscriptionId>,
    },

    /// Payment settled between the pre-check and the lock. Nothing written.
    AlreadySettled,

    /// The payment state machine refused the reported status. Nothing written.
    RejectedTransition { reason: String },
}

/// Decision reached inside the transaction.
enum Step {
    Commit(Reconciliation),
    Abort(Reconciliation),
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn BillingStore>,
    plans: Arc<dyn PlanCatalog>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn BillingStore>, plans: Arc<dyn PlanCatalog>) -> Self {
        Self { store, plans }
    }

    /// Applies `notification` atomically.
    ///
    /// `event` must be the `received` ledger row for the notification. Its
    /// `validated` and `processed` transitions are written in the same
    /// transaction as the business rows.
    ///
    /// # Errors
    ///
    /// `ValidationFailed` for an access-granting notification without a plan.
    /// Otherwise any storage or catalog error. The transaction is rolled back
    /// before the error is returned.
    pub async fn reconcile(
        &self,
        event: &WebhookEvent,
        notification: &PaymentNotification,
    ) -> Result<Reconciliation, DomainError> {
        let Some(status) = notification.payment_status() else {
            return Ok(Reconciliation::RejectedTransition {
                reason: format!("Unsupported event type '{}'", notification.event_type),
            });
        };

        // Resolved before any lock is held.
        let plan = match (&notification.data.plan_id, status.grants_access()) {
            (Some(plan_id), true) => {
                let duration = self.plans.get_duration(plan_id).await?;
                Some((plan_id.as_str(), Some(duration)))
            }
            (Some(plan_id), false) => Some((plan_id.as_str(), None)),
            (None, true) => {
                return Err(DomainError::validation(
                    "planId",
                    "Access-granting payment does not name a plan",
                ))
            }
            (None, false) => None,
        };

        let mut tx = self.store.begin().await?;
        let step = apply(&mut *tx, event, notification, status, plan).await;

        match step {
            Ok(Step::Commit(reconciliation)) => {
                tx.commit().await?;
                Ok(reconciliation)
            }
            Ok(Step::Abort(reconciliation)) => {
                tx.rollback().await?;
                Ok(reconciliation)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        webhook_event_id = %event.id,
                        error = %rollback_err,
                        "Rollback after reconciliation failure also failed"
                    );
                }
                Err(err)
            }
        }
    }
}

async fn apply(
    tx: &mut dyn BillingTransaction,
    event: &WebhookEvent,
    notification: &PaymentNotification,
    status: PaymentStatus,
    plan: Option<(&str, Option<Duration>)>,
) -> Result<Step, DomainError> {
    let data = &notification.data;

    let existing = tx.lock_payment(&data.payment_id).await?;
    if existing.as_ref().is_some_and(Payment::is_settled) {
        return Ok(Step::Abort(Reconciliation::AlreadySettled));
    }

    let mut event = event.clone();
    event.mark_validated()?;
    tx.update_webhook_event(&event).await?;

    let user = match &data.customer {
        CustomerIdentity::Email(email) => tx.find_or_create_user_by_email(email).await?,
        CustomerIdentity::ExternalId(customer_id) => {
            tx.find_or_create_user_by_external_customer_id(customer_id)
                .await?
        }
    };

    let now = Timestamp::now();
    let subscription_id = match plan {
        Some((plan_id, duration)) => {
            let active = tx.lock_active_subscription(&user.id, plan_id).await?;
            match (active, duration) {
                (Some(mut subscription), Some(duration)) => {
                    subscription.extend(duration, now)?;
                    tx.update_subscription(&subscription).await?;
                    Some(subscription.id)
                }
                (None, Some(duration)) => {
                    let subscription = Subscription::start(user.id, plan_id, duration, now);
                    tx.insert_subscription(&subscription).await?;
                    Some(subscription.id)
                }
                (active, None) => active.map(|s| s.id),
            }
        }
        None => None,
    };

    let update = PaymentUpdate {
        status,
        amount: data.amount,
        currency: data.currency.clone(),
        user_id: user.id,
        subscription_id,
        external_event_id: notification.id.clone(),
        raw_payload_id: event.id,
        paid_at: data.paid_at.unwrap_or(now),
    };

    let payment = match existing {
        Some(mut payment) => {
            if let Err(err) = payment.apply(update) {
                return Ok(Step::Abort(Reconciliation::RejectedTransition {
                    reason: err.message,
                }));
            }
            tx.update_payment(&payment).await?;
            payment
        }
        None => {
            let payment = Payment::record(&data.payment_id, update);
            tx.insert_payment(&payment).await?;
            payment
        }
    };

    event.mark_processed(now)?;
    tx.update_webhook_event(&event).await?;

    Ok(Step::Commit(Reconciliation::Applied {
        user_id: user.id,
        payment_id: payment.id,
        subscription_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FailPoint, InMemoryBillingStore};
    use crate::adapters::plans::ConfiguredPlanCatalog;
    use crate::domain::billing::{SubscriptionStatus, WebhookEventStatus};
    use crate::domain::foundation::ErrorCode;
    use crate::ports::WebhookEventRepository;
    use serde_json::{json, Value};

    // ══════════════════════════════════════════════════════════════
    // Test Fixtures
    // ══════════════════════════════════════════════════════════════

    fn document(event_id: &str, event_type: &str, payment_id: &str) -> Value {
        json!({
            "id": event_id,
            "eventType": event_type,
            "data": {
                "paymentId": payment_id,
                "amount": "29.00",
                "currency": "usd",
                "customerEmail": "jane@example.com",
                "planId": "monthly"
            }
        })
    }

    fn engine(store: &InMemoryBillingStore) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::new(store.clone()),
            Arc::new(ConfiguredPlanCatalog::default()),
        )
    }

    async fn recorded(
        store: &InMemoryBillingStore,
        document: Value,
    ) -> (WebhookEvent, PaymentNotification) {
        let notification = PaymentNotification::parse(&document).unwrap();
        let event = WebhookEvent::received(
            notification.id.clone(),
            Some(notification.data.payment_id.clone()),
            notification.event_type.clone(),
            document,
        );
        store.insert(&event).await.unwrap();
        (event, notification)
    }

    // ══════════════════════════════════════════════════════════════
    // Applying
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn succeeded_payment_creates_user_subscription_and_payment() {
        let store = InMemoryBillingStore::new();
        let (event, notification) =
            recorded(&store, document("evt_1", "payment.succeeded", "pay_1")).await;

        let result = engine(&store).reconcile(&event, &notification).await.unwrap();

        let Reconciliation::Applied { subscription_id, .. } = result else {
            panic!("expected Applied, got {:?}", result);
        };
        assert!(subscription_id.is_some());
        assert_eq!(store.users().await.len(), 1);

        let subscriptions = store.subscriptions().await;
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].status, SubscriptionStatus::Active);
        assert_eq!(
            subscriptions[0]
                .current_period_end
                .duration_since(&subscriptions[0].current_period_start),
            Duration::days(30)
        );

        let payments = store.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Succeeded);
        assert_eq!(payments[0].raw_payload_id, Some(event.id));
        assert_eq!(payments[0].external_event_id.as_deref(), Some("evt_1"));

        let stored = store.webhook_event(&event.id).await.unwrap();
        assert_eq!(stored.status, WebhookEventStatus::Processed);
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn pending_payment_does_not_grant_access() {
        let store = InMemoryBillingStore::new();
        let (event, notification) =
            recorded(&store, document("evt_1", "payment.pending", "pay_1")).await;

        engine(&store).reconcile(&event, &notification).await.unwrap();

        assert!(store.subscriptions().await.is_empty());
        assert_eq!(store.payments().await[0].status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn pending_then_succeeded_updates_same_row() {
        let store = InMemoryBillingStore::new();
        let (pending, n1) = recorded(&store, document("evt_1", "payment.pending", "pay_1")).await;
        engine(&store).reconcile(&pending, &n1).await.unwrap();
        let (succeeded, n2) =
            recorded(&store, document("evt_2", "payment.succeeded", "pay_1")).await;
        engine(&store).reconcile(&succeeded, &n2).await.unwrap();

        let payments = store.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Succeeded);
        assert_eq!(payments[0].external_event_id.as_deref(), Some("evt_2"));
        assert!(payments[0].subscription_id.is_some());
    }

    #[tokio::test]
    async fn customer_id_identity_creates_user_without_email() {
        let store = InMemoryBillingStore::new();
        let mut doc = document("evt_1", "payment.succeeded", "pay_1");
        doc["data"].as_object_mut().unwrap().remove("customerEmail");
        doc["data"]["customerId"] = json!("cus_1");
        let (event, notification) = recorded(&store, doc).await;

        engine(&store).reconcile(&event, &notification).await.unwrap();

        let users = store.users().await;
        assert_eq!(users.len(), 1);
        assert!(users[0].email.is_none());
        assert_eq!(users[0].external_customer_id.as_deref(), Some("cus_1"));
    }

    // ══════════════════════════════════════════════════════════════
    // Aborting
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn settled_payment_aborts_without_writes() {
        let store = InMemoryBillingStore::new();
        let (first, n1) = recorded(&store, document("evt_1", "payment.succeeded", "pay_1")).await;
        engine(&store).reconcile(&first, &n1).await.unwrap();
        let (second, n2) = recorded(&store, document("evt_2", "payment.succeeded", "pay_1")).await;

        let result = engine(&store).reconcile(&second, &n2).await.unwrap();

        assert_eq!(result, Reconciliation::AlreadySettled);
        assert_eq!(store.subscriptions().await.len(), 1);
        let stored = store.webhook_event(&second.id).await.unwrap();
        assert_eq!(stored.status, WebhookEventStatus::Received);
    }

    #[tokio::test]
    async fn illegal_payment_transition_is_rejected() {
        let store = InMemoryBillingStore::new();
        let (pending, n1) = recorded(&store, document("evt_1", "payment.pending", "pay_1")).await;
        engine(&store).reconcile(&pending, &n1).await.unwrap();
        let (refund, n2) = recorded(&store, document("evt_2", "payment.refunded", "pay_1")).await;

        let result = engine(&store).reconcile(&refund, &n2).await.unwrap();

        assert!(matches!(result, Reconciliation::RejectedTransition { .. }));
        assert_eq!(store.payments().await[0].status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_plan_fails_before_opening_transaction() {
        let store = InMemoryBillingStore::new();
        let mut doc = document("evt_1", "payment.succeeded", "pay_1");
        doc["data"]["planId"] = json!("lifetime");
        let (event, notification) = recorded(&store, doc).await;

        let err = engine(&store).reconcile(&event, &notification).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UnknownPlan);
        assert!(store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn failure_mid_transaction_rolls_everything_back() {
        let store = InMemoryBillingStore::new();
        let (event, notification) =
            recorded(&store, document("evt_1", "payment.succeeded", "pay_1")).await;
        store.fail_at(FailPoint::InsertPayment).await;

        let err = engine(&store).reconcile(&event, &notification).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(store.users().await.is_empty());
        assert!(store.subscriptions().await.is_empty());
        assert!(store.payments().await.is_empty());
        let stored = store.webhook_event(&event.id).await.unwrap();
        assert_eq!(stored.status, WebhookEventStatus::Received);
    }

    #[tokio::test]
    async fn succeeded_payment_without_plan_is_refused() {
        let store = InMemoryBillingStore::new();
        let (event, mut notification) =
            recorded(&store, document("evt_1", "payment.succeeded", "pay_1")).await;
        notification.data.plan_id = None;

        let err = engine(&store).reconcile(&event, &notification).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(store.payments().await.is_empty());
        assert!(store.users().await.is_empty());
    }
}
