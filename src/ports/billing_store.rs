//! BillingStore port - transactional access to users, payments and subscriptions.
//!
//! Reconciliation runs every write for one notification inside a single
//! `BillingTransaction`: either all of them become visible on `commit` or
//! none of them do.
//!
//! # Locking
//!
//! `lock_payment` and `lock_active_subscription` hold their locks until the
//! transaction ends. Callers take them in that order (payment first) to keep
//! concurrent transactions from deadlocking.

use async_trait::async_trait;

use crate::domain::billing::{Payment, Subscription, User, WebhookEvent};
use crate::domain::foundation::{DomainError, UserId};

/// Factory for billing transactions.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError>;
}

/// One open unit of work.
///
/// Dropping a transaction without calling `commit` discards its writes.
#[async_trait]
pub trait BillingTransaction: Send {
    /// Persists the status fields of a webhook event inside this transaction.
    async fn update_webhook_event(&mut self, event: &WebhookEvent) -> Result<(), DomainError>;

    /// Returns the user with this (normalized) email, creating it if needed.
    async fn find_or_create_user_by_email(&mut self, email: &str) -> Result<User, DomainError>;

    /// Returns the user with this provider customer id, creating it if needed.
    async fn find_or_create_user_by_external_customer_id(
        &mut self,
        external_customer_id: &str,
    ) -> Result<User, DomainError>;

    /// Serializes work on one provider payment id and returns its current row.
    ///
    /// The lock is taken even when no row exists yet, so two transactions
    /// racing to create the same payment run one after the other.
    async fn lock_payment(
        &mut self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError>;

    /// Serializes work on the (user, plan) slot and returns its active subscription.
    async fn lock_active_subscription(
        &mut self,
        user_id: &UserId,
        plan_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Inserts a subscription.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateActiveSubscription` if the (user, plan) slot already
    /// has an active row.
    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn update_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Makes every write visible and releases the locks.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every write and releases the locks.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
