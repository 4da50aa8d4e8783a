//! In-memory billing store for tests.
//!
//! Implements every storage port against one shared state. Transactions are
//! serialized behind a `tokio::sync::Mutex`: a transaction holds the lock
//! from `begin` to `commit`/`rollback`, works on a copy of the state, and
//! swaps the copy in on commit. That gives the same guarantees the engine
//! relies on from PostgreSQL (row locks, atomic commit, unique constraints),
//! just with coarser locking.
//!
//! Do not call the ledger ports from a task that holds an open transaction;
//! both take the same lock.
//!
//! # Example
//!
//! ```ignore
//! let store = InMemoryBillingStore::new();
//! store.fail_at(FailPoint::InsertPayment).await;
//!
//! // ... drive the pipeline ...
//!
//! assert!(store.payments().await.is_empty());
//! ```

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::billing::{
    normalize_email, Payment, Subscription, User, WebhookEvent, WebhookEventStatus,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId, WebhookEventId};
use crate::ports::{
    BillingStore, BillingTransaction, PaymentReader, SaveResult, WebhookEventRepository,
};

/// Operation that can be made to fail once, for exercising rollback paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertWebhookEvent,
    UpdateWebhookStatus,
    FindPayment,
    Begin,
    FindOrCreateUser,
    LockPayment,
    InsertPayment,
    UpdatePayment,
    LockSubscription,
    InsertSubscription,
    UpdateSubscription,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    webhook_events: Vec<WebhookEvent>,
    users: Vec<User>,
    payments: Vec<Payment>,
    subscriptions: Vec<Subscription>,
}

impl MemoryState {
    fn webhook_event_mut(&mut self, id: &WebhookEventId) -> Result<&mut WebhookEvent, DomainError> {
        self.webhook_events
            .iter_mut()
            .find(|e| e.id == *id)
            .ok_or_else(|| DomainError::new(ErrorCode::WebhookEventNotFound, "Webhook event not found"))
    }

    fn write_status(&mut self, event: &WebhookEvent) -> Result<(), DomainError> {
        let stored = self.webhook_event_mut(&event.id)?;
        stored.status = event.status;
        stored.error_message = event.error_message.clone();
        stored.processed_at = event.processed_at;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FailPoints(StdMutex<HashSet<FailPoint>>);

impl FailPoints {
    fn arm(&self, point: FailPoint) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    /// Fails once if `point` is armed, disarming it.
    fn trip(&self, point: FailPoint) -> Result<(), DomainError> {
        let fired = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&point);
        if fired {
            return Err(DomainError::database(format!("Injected failure at {:?}", point)));
        }
        Ok(())
    }
}

/// In-memory implementation of all storage ports.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingStore {
    state: Arc<Mutex<MemoryState>>,
    fail_points: Arc<FailPoints>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `point` fail with a database error.
    pub async fn fail_at(&self, point: FailPoint) {
        self.fail_points.arm(point);
    }

    // === Test Helpers ===

    pub async fn webhook_events(&self) -> Vec<WebhookEvent> {
        self.state.lock().await.webhook_events.clone()
    }

    pub async fn webhook_event(&self, id: &WebhookEventId) -> Option<WebhookEvent> {
        self.state
            .lock()
            .await
            .webhook_events
            .iter()
            .find(|e| e.id == *id)
            .cloned()
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.lock().await.users.clone()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().await.subscriptions.clone()
    }

    pub async fn seed_user(&self, user: User) {
        self.state.lock().await.users.push(user);
    }

    pub async fn seed_payment(&self, payment: Payment) {
        self.state.lock().await.payments.push(payment);
    }

    pub async fn seed_subscription(&self, subscription: Subscription) {
        self.state.lock().await.subscriptions.push(subscription);
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryBillingStore {
    async fn insert(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError> {
        self.fail_points.trip(FailPoint::InsertWebhookEvent)?;
        let mut state = self.state.lock().await;

        if let Some(external_id) = &event.external_event_id {
            let existing = state
                .webhook_events
                .iter()
                .find(|e| e.external_event_id.as_ref() == Some(external_id));
            if let Some(existing) = existing {
                return Ok(SaveResult::AlreadyExists(existing.clone()));
            }
        }

        state.webhook_events.push(event.clone());
        Ok(SaveResult::Inserted(event.clone()))
    }

    async fn find_by_id(&self, id: &WebhookEventId) -> Result<Option<WebhookEvent>, DomainError> {
        Ok(self.webhook_event(id).await)
    }

    async fn update_status(&self, event: &WebhookEvent) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::UpdateWebhookStatus)?;
        self.state.lock().await.write_status(event)
    }

    async fn reclaim_failed(&self, id: &WebhookEventId) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let stored = state.webhook_event_mut(id)?;
        if stored.status != WebhookEventStatus::Failed {
            return Ok(false);
        }
        stored.status = WebhookEventStatus::Received;
        stored.error_message = None;
        stored.processed_at = None;
        Ok(true)
    }

    async fn reclaim_stale(
        &self,
        id: &WebhookEventId,
        received_before: Timestamp,
        claimed_at: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let stored = state.webhook_event_mut(id)?;
        if stored.status != WebhookEventStatus::Received
            || stored.received_at.is_after(&received_before)
        {
            return Ok(false);
        }
        stored.received_at = claimed_at;
        Ok(true)
    }
}

#[async_trait]
impl PaymentReader for InMemoryBillingStore {
    async fn find_by_external_payment_id(
        &self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        self.fail_points.trip(FailPoint::FindPayment)?;
        Ok(self
            .state
            .lock()
            .await
            .payments
            .iter()
            .find(|p| p.external_payment_id == external_payment_id)
            .cloned())
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        self.fail_points.trip(FailPoint::Begin)?;
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryBillingTransaction {
            guard,
            working,
            fail_points: self.fail_points.clone(),
        }))
    }
}

/// Open transaction over the in-memory state.
///
/// Dropping it without `commit` releases the lock and discards `working`.
pub struct InMemoryBillingTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_points: Arc<FailPoints>,
}

#[async_trait]
impl BillingTransaction for InMemoryBillingTransaction {
    async fn update_webhook_event(&mut self, event: &WebhookEvent) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::UpdateWebhookStatus)?;
        self.working.write_status(event)
    }

    async fn find_or_create_user_by_email(&mut self, email: &str) -> Result<User, DomainError> {
        self.fail_points.trip(FailPoint::FindOrCreateUser)?;
        let email = normalize_email(email);
        if let Some(user) = self
            .working
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email.as_str()))
        {
            return Ok(user.clone());
        }
        let user = User::with_email(&email);
        self.working.users.push(user.clone());
        Ok(user)
    }

    async fn find_or_create_user_by_external_customer_id(
        &mut self,
        external_customer_id: &str,
    ) -> Result<User, DomainError> {
        self.fail_points.trip(FailPoint::FindOrCreateUser)?;
        if let Some(user) = self
            .working
            .users
            .iter()
            .find(|u| u.external_customer_id.as_deref() == Some(external_customer_id))
        {
            return Ok(user.clone());
        }
        let user = User::with_external_customer_id(external_customer_id);
        self.working.users.push(user.clone());
        Ok(user)
    }

    async fn lock_payment(
        &mut self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        self.fail_points.trip(FailPoint::LockPayment)?;
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| p.external_payment_id == external_payment_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::InsertPayment)?;
        let conflict = self.working.payments.iter().any(|p| {
            p.external_payment_id == payment.external_payment_id
                || (payment.external_event_id.is_some()
                    && p.external_event_id == payment.external_event_id)
        });
        if conflict {
            return Err(DomainError::database("duplicate key value violates unique constraint on payments"));
        }
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::UpdatePayment)?;
        let stored = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.id == payment.id)
            .ok_or_else(|| DomainError::new(ErrorCode::PaymentNotFound, "Payment not found"))?;
        *stored = payment.clone();
        Ok(())
    }

    async fn lock_active_subscription(
        &mut self,
        user_id: &UserId,
        plan_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        self.fail_points.trip(FailPoint::LockSubscription)?;
        Ok(self
            .working
            .subscriptions
            .iter()
            .find(|s| s.user_id == *user_id && s.plan_id == plan_id && s.is_active())
            .cloned())
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::InsertSubscription)?;
        let slot_taken = subscription.is_active()
            && self.working.subscriptions.iter().any(|s| {
                s.user_id == subscription.user_id
                    && s.plan_id == subscription.plan_id
                    && s.is_active()
            });
        if slot_taken {
            return Err(DomainError::new(
                ErrorCode::DuplicateActiveSubscription,
                "User already has an active subscription for this plan",
            ));
        }
        self.working.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn update_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::UpdateSubscription)?;
        let stored = self
            .working
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
            })?;
        *stored = subscription.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.fail_points.trip(FailPoint::Commit)?;
        let InMemoryBillingTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn event(external_id: &str) -> WebhookEvent {
        WebhookEvent::received(Some(external_id.to_string()), None, "payment.succeeded", json!({}))
    }

    #[tokio::test]
    async fn duplicate_insert_returns_existing_row() {
        let store = InMemoryBillingStore::new();
        let first = event("evt_1");
        store.insert(&first).await.unwrap();

        let result = store.insert(&event("evt_1")).await.unwrap();

        assert_eq!(result, SaveResult::AlreadyExists(first));
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let store = InMemoryBillingStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.find_or_create_user_by_email("a@example.com").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.users().await.len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = InMemoryBillingStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.find_or_create_user_by_email("a@example.com").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.users().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryBillingStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.find_or_create_user_by_email("a@example.com").await.unwrap();
        }
        assert!(store.users().await.is_empty());
    }

    #[tokio::test]
    async fn find_or_create_user_is_idempotent() {
        let store = InMemoryBillingStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = tx.find_or_create_user_by_email("A@example.com").await.unwrap();
        let b = tx.find_or_create_user_by_email("a@example.com ").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn second_active_subscription_for_same_plan_is_refused() {
        let store = InMemoryBillingStore::new();
        let user_id = UserId::new();
        let now = Timestamp::now();
        let mut tx = store.begin().await.unwrap();
        tx.insert_subscription(&Subscription::start(user_id, "monthly", Duration::days(30), now))
            .await
            .unwrap();

        let err = tx
            .insert_subscription(&Subscription::start(user_id, "monthly", Duration::days(30), now))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::DuplicateActiveSubscription);
    }

    #[tokio::test]
    async fn fail_point_fires_once() {
        let store = InMemoryBillingStore::new();
        store.fail_at(FailPoint::Begin).await;
        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_ok());
    }
}
