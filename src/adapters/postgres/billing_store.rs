//! PostgreSQL implementation of BillingStore.
//!
//! # Locking
//!
//! Both lock operations take a transaction-scoped advisory lock on a key
//! derived from the business identity, then read the row `FOR UPDATE`.
//! The advisory lock covers the case where the row does not exist yet, which
//! `FOR UPDATE` alone cannot. Locks are released on commit or rollback.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::rows::{
    db_error, payment_status_to_string, subscription_status_to_string, PaymentRow,
    SubscriptionRow, UserRow, PAYMENT_COLUMNS, SUBSCRIPTION_COLUMNS, USER_COLUMNS,
};
use super::webhook_event_repository::write_status;
use crate::domain::billing::{normalize_email, Payment, Subscription, User, WebhookEvent};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{BillingStore, BillingTransaction};

/// Bounds how long a transaction waits for a row or advisory lock.
const LOCK_TIMEOUT: &str = "5s";

const ACTIVE_SUBSCRIPTION_CONSTRAINT: &str = "subscriptions_one_active_per_plan";

pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn begin(&self) -> Result<Box<dyn BillingTransaction>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("begin transaction"))?;

        sqlx::query(&format!("SET LOCAL lock_timeout = '{}'", LOCK_TIMEOUT))
            .execute(&mut *tx)
            .await
            .map_err(db_error("set lock timeout"))?;

        Ok(Box::new(PostgresBillingTransaction { tx }))
    }
}

pub struct PostgresBillingTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresBillingTransaction {
    async fn advisory_lock(&mut self, key: &str) -> Result<(), DomainError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("acquire advisory lock"))?;
        Ok(())
    }

    async fn find_user_by(&mut self, column: &str, value: &str) -> Result<User, DomainError> {
        let row: UserRow = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE {} = $1",
            USER_COLUMNS, column
        ))
        .bind(value)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("load user"))?;
        Ok(row.into())
    }
}

#[async_trait]
impl BillingTransaction for PostgresBillingTransaction {
    async fn update_webhook_event(&mut self, event: &WebhookEvent) -> Result<(), DomainError> {
        write_status(&mut *self.tx, event).await
    }

    async fn find_or_create_user_by_email(&mut self, email: &str) -> Result<User, DomainError> {
        let email = normalize_email(email);
        sqlx::query(
            r#"
            INSERT INTO users (id, email, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(Timestamp::now().as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("create user"))?;

        self.find_user_by("email", &email).await
    }

    async fn find_or_create_user_by_external_customer_id(
        &mut self,
        external_customer_id: &str,
    ) -> Result<User, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_customer_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_customer_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(external_customer_id)
        .bind(Timestamp::now().as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("create user"))?;

        self.find_user_by("external_customer_id", external_customer_id)
            .await
    }

    async fn lock_payment(
        &mut self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        self.advisory_lock(&format!("payment:{}", external_payment_id))
            .await?;

        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE external_payment_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(external_payment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("lock payment"))?;

        row.map(Payment::try_from).transpose()
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, subscription_id, external_payment_id, external_event_id,
                amount, currency, status, raw_payload_id, paid_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.map(|id| *id.as_uuid()))
        .bind(payment.subscription_id.map(|id| *id.as_uuid()))
        .bind(&payment.external_payment_id)
        .bind(&payment.external_event_id)
        .bind(payment.amount)
        .bind(payment.currency.as_str())
        .bind(payment_status_to_string(&payment.status))
        .bind(payment.raw_payload_id.map(|id| *id.as_uuid()))
        .bind(payment.paid_at.map(|t| *t.as_datetime()))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("insert payment"))?;

        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                user_id = $2,
                subscription_id = $3,
                external_event_id = $4,
                amount = $5,
                currency = $6,
                status = $7,
                raw_payload_id = $8,
                paid_at = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.map(|id| *id.as_uuid()))
        .bind(payment.subscription_id.map(|id| *id.as_uuid()))
        .bind(&payment.external_event_id)
        .bind(payment.amount)
        .bind(payment.currency.as_str())
        .bind(payment_status_to_string(&payment.status))
        .bind(payment.raw_payload_id.map(|id| *id.as_uuid()))
        .bind(payment.paid_at.map(|t| *t.as_datetime()))
        .bind(payment.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("update payment"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::PaymentNotFound, "Payment not found"));
        }
        Ok(())
    }

    async fn lock_active_subscription(
        &mut self,
        user_id: &UserId,
        plan_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        self.advisory_lock(&format!("subscription:{}:{}", user_id, plan_id))
            .await?;

        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE user_id = $1 AND plan_id = $2 AND status = 'active'
            FOR UPDATE
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id.as_uuid())
        .bind(plan_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("lock subscription"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, status, current_period_start, current_period_end,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(&subscription.plan_id)
        .bind(subscription_status_to_string(&subscription.status))
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(ACTIVE_SUBSCRIPTION_CONSTRAINT) {
                    return DomainError::new(
                        ErrorCode::DuplicateActiveSubscription,
                        "User already has an active subscription for this plan",
                    );
                }
            }
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to insert subscription: {}", e),
            )
        })?;

        Ok(())
    }

    async fn update_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                current_period_start = $3,
                current_period_end = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription_status_to_string(&subscription.status))
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("update subscription"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            ));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(db_error("commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(db_error("roll back transaction"))
    }
}
