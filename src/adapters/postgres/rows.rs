//! Row types and column conversions shared by the billing adapters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::billing::{
    Currency, Payment, PaymentStatus, Subscription, SubscriptionStatus, User, WebhookEvent,
    WebhookEventStatus,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp, UserId, WebhookEventId,
};

pub(super) const WEBHOOK_EVENT_COLUMNS: &str = "id, external_event_id, external_payment_id, event_type, payload, \
     signature_valid, status, error_message, received_at, processed_at";

pub(super) const PAYMENT_COLUMNS: &str = "id, user_id, subscription_id, external_payment_id, external_event_id, \
     amount, currency, status, raw_payload_id, paid_at, created_at, updated_at";

pub(super) const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, current_period_start, \
     current_period_end, created_at, updated_at";

pub(super) const USER_COLUMNS: &str = "id, email, external_customer_id, created_at";

/// Maps a sqlx error to a domain database error.
pub(super) fn db_error(action: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

// ════════════════════════════════════════════════════════════════
// Webhook events
// ════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub(super) struct WebhookEventRow {
    id: Uuid,
    external_event_id: Option<String>,
    external_payment_id: Option<String>,
    event_type: String,
    payload: serde_json::Value,
    signature_valid: bool,
    status: String,
    error_message: Option<String>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEvent {
            id: WebhookEventId::from_uuid(row.id),
            external_event_id: row.external_event_id,
            external_payment_id: row.external_payment_id,
            event_type: row.event_type,
            payload: row.payload,
            signature_valid: row.signature_valid,
            status: parse_webhook_event_status(&row.status)?,
            error_message: row.error_message,
            received_at: Timestamp::from_datetime(row.received_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
        })
    }
}

pub(super) fn parse_webhook_event_status(s: &str) -> Result<WebhookEventStatus, DomainError> {
    match s {
        "received" => Ok(WebhookEventStatus::Received),
        "validated" => Ok(WebhookEventStatus::Validated),
        "processed" => Ok(WebhookEventStatus::Processed),
        "duplicate" => Ok(WebhookEventStatus::Duplicate),
        "failed" => Ok(WebhookEventStatus::Failed),
        "ignored" => Ok(WebhookEventStatus::Ignored),
        _ => Err(invalid_column("webhook_events.status", s)),
    }
}

pub(super) fn webhook_event_status_to_string(status: &WebhookEventStatus) -> &'static str {
    match status {
        WebhookEventStatus::Received => "received",
        WebhookEventStatus::Validated => "validated",
        WebhookEventStatus::Processed => "processed",
        WebhookEventStatus::Duplicate => "duplicate",
        WebhookEventStatus::Failed => "failed",
        WebhookEventStatus::Ignored => "ignored",
    }
}

// ════════════════════════════════════════════════════════════════
// Payments
// ════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PaymentRow {
    id: Uuid,
    user_id: Option<Uuid>,
    subscription_id: Option<Uuid>,
    external_payment_id: String,
    external_event_id: Option<String>,
    amount: Decimal,
    currency: String,
    status: String,
    raw_payload_id: Option<Uuid>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: row.user_id.map(UserId::from_uuid),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            external_payment_id: row.external_payment_id,
            external_event_id: row.external_event_id,
            amount: row.amount,
            currency: Currency::parse(&row.currency)
                .map_err(|_| invalid_column("payments.currency", &row.currency))?,
            status: parse_payment_status(&row.status)?,
            raw_payload_id: row.raw_payload_id.map(WebhookEventId::from_uuid),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus, DomainError> {
    match s {
        "pending" => Ok(PaymentStatus::Pending),
        "succeeded" => Ok(PaymentStatus::Succeeded),
        "failed" => Ok(PaymentStatus::Failed),
        "refunded" => Ok(PaymentStatus::Refunded),
        "chargeback" => Ok(PaymentStatus::Chargeback),
        _ => Err(invalid_column("payments.status", s)),
    }
}

pub(super) fn payment_status_to_string(status: &PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Succeeded => "succeeded",
        PaymentStatus::Failed => "failed",
        PaymentStatus::Refunded => "refunded",
        PaymentStatus::Chargeback => "chargeback",
    }
}

// ════════════════════════════════════════════════════════════════
// Subscriptions
// ════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_id: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            plan_id: row.plan_id,
            status: parse_subscription_status(&row.status)?,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus, DomainError> {
    match s {
        "pending" => Ok(SubscriptionStatus::Pending),
        "active" => Ok(SubscriptionStatus::Active),
        "expired" => Ok(SubscriptionStatus::Expired),
        "canceled" => Ok(SubscriptionStatus::Canceled),
        _ => Err(invalid_column("subscriptions.status", s)),
    }
}

pub(super) fn subscription_status_to_string(status: &SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Pending => "pending",
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Expired => "expired",
        SubscriptionStatus::Canceled => "canceled",
    }
}

// ════════════════════════════════════════════════════════════════
// Users
// ════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UserRow {
    id: Uuid,
    email: Option<String>,
    external_customer_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            external_customer_id: row.external_customer_id,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

fn invalid_column(column: &str, value: &str) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, value),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_event_status_round_trips_through_column_text() {
        for status in [
            WebhookEventStatus::Received,
            WebhookEventStatus::Validated,
            WebhookEventStatus::Processed,
            WebhookEventStatus::Duplicate,
            WebhookEventStatus::Failed,
            WebhookEventStatus::Ignored,
        ] {
            let text = webhook_event_status_to_string(&status);
            assert_eq!(parse_webhook_event_status(text).unwrap(), status);
        }
    }

    #[test]
    fn column_text_matches_serde_names() {
        assert_eq!(
            serde_json::to_value(PaymentStatus::Chargeback).unwrap(),
            payment_status_to_string(&PaymentStatus::Chargeback)
        );
        assert_eq!(
            serde_json::to_value(SubscriptionStatus::Canceled).unwrap(),
            subscription_status_to_string(&SubscriptionStatus::Canceled)
        );
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let err = parse_payment_status("settled").unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(parse_subscription_status("paused").is_err());
    }
}
