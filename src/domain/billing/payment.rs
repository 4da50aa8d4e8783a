//! Payment entity - one provider payment attempt.
//!
//! There is exactly one row per `external_payment_id`. Later notifications
//! about the same payment move that row through the payment state machine
//! instead of inserting a new one.

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp, UserId, WebhookEventId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Currency, PaymentStatus};

/// Facts a single notification contributes to a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub user_id: UserId,
    pub subscription_id: Option<SubscriptionId>,
    pub external_event_id: Option<String>,
    pub raw_payload_id: WebhookEventId,
    pub paid_at: Timestamp,
}

/// Provider payment attempt.
///
/// # Invariants
///
/// - `external_payment_id` is unique
/// - `external_event_id` is unique when present; it names the last event applied
/// - `amount` carries two fractional digits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: Option<UserId>,
    pub subscription_id: Option<SubscriptionId>,
    pub external_payment_id: String,
    pub external_event_id: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// Webhook event whose payload last produced this state.
    pub raw_payload_id: Option<WebhookEventId>,
    pub paid_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    /// Creates the payment row for the first notification seen about it.
    pub fn record(external_payment_id: impl Into<String>, update: PaymentUpdate) -> Self {
        let now = Timestamp::now();
        Self {
            id: PaymentId::new(),
            user_id: Some(update.user_id),
            subscription_id: update.subscription_id,
            external_payment_id: external_payment_id.into(),
            external_event_id: update.external_event_id,
            amount: update.amount,
            currency: update.currency,
            status: update.status,
            raw_payload_id: Some(update.raw_payload_id),
            paid_at: Some(update.paid_at),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a later notification to the existing row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the payment state machine does
    /// not allow the move. The payment is left untouched in that case.
    pub fn apply(&mut self, update: PaymentUpdate) -> Result<(), DomainError> {
        self.transition_to(update.status)?;
        self.user_id = Some(update.user_id);
        self.subscription_id = update.subscription_id.or(self.subscription_id);
        self.external_event_id = update.external_event_id;
        self.amount = update.amount;
        self.currency = update.currency;
        self.raw_payload_id = Some(update.raw_payload_id);
        self.paid_at = Some(update.paid_at);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Returns true once business logic must not be re-applied for this payment.
    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }

    fn transition_to(&mut self, target: PaymentStatus) -> Result<(), DomainError> {
        use crate::domain::foundation::StateMachine;

        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition payment from {:?} to {:?}",
                    self.status, target
                ),
            )
            .with_detail("external_payment_id", self.external_payment_id.clone())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn update(status: PaymentStatus) -> PaymentUpdate {
        PaymentUpdate {
            status,
            amount: Decimal::from_str("19.99").unwrap(),
            currency: Currency::parse("usd").unwrap(),
            user_id: UserId::new(),
            subscription_id: None,
            external_event_id: Some("evt_1".to_string()),
            raw_payload_id: WebhookEventId::new(),
            paid_at: Timestamp::now(),
        }
    }

    #[test]
    fn record_copies_notification_facts() {
        let u = update(PaymentStatus::Pending);
        let payment = Payment::record("pay_1", u.clone());
        assert_eq!(payment.external_payment_id, "pay_1");
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.user_id, Some(u.user_id));
        assert_eq!(payment.raw_payload_id, Some(u.raw_payload_id));
        assert!(!payment.is_settled());
    }

    #[test]
    fn pending_payment_settles_in_place() {
        let mut payment = Payment::record("pay_1", update(PaymentStatus::Pending));
        let id = payment.id;
        let mut next = update(PaymentStatus::Succeeded);
        next.external_event_id = Some("evt_2".to_string());

        payment.apply(next).unwrap();

        assert_eq!(payment.id, id);
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert_eq!(payment.external_event_id.as_deref(), Some("evt_2"));
        assert!(payment.is_settled());
    }

    #[test]
    fn illegal_transition_leaves_payment_untouched() {
        let mut payment = Payment::record("pay_1", update(PaymentStatus::Failed));
        let before = payment.clone();

        let err = payment.apply(update(PaymentStatus::Succeeded)).unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(payment, before);
    }

    #[test]
    fn apply_keeps_existing_subscription_link_when_none_given() {
        let mut first = update(PaymentStatus::Pending);
        let subscription_id = SubscriptionId::new();
        first.subscription_id = Some(subscription_id);
        let mut payment = Payment::record("pay_1", first);

        payment.apply(update(PaymentStatus::Failed)).unwrap();

        assert_eq!(payment.subscription_id, Some(subscription_id));
    }
}
