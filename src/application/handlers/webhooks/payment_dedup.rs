//! PaymentDeduplicationIndex - duplicate detection by provider payment id.
//!
//! Catches resends that arrive under a new notification id (or none at all)
//! for a payment whose outcome is already final.

use std::sync::Arc;

use crate::domain::foundation::DomainError;
use crate::ports::PaymentReader;

#[derive(Clone)]
pub struct PaymentDeduplicationIndex {
    reader: Arc<dyn PaymentReader>,
}

impl PaymentDeduplicationIndex {
    pub fn new(reader: Arc<dyn PaymentReader>) -> Self {
        Self { reader }
    }

    /// Returns true if the payment exists and is no longer pending.
    pub async fn is_settled(&self, external_payment_id: &str) -> Result<bool, DomainError> {
        let payment = self
            .reader
            .find_by_external_payment_id(external_payment_id)
            .await?;
        Ok(payment.map(|p| p.is_settled()).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{Currency, Payment, PaymentStatus, PaymentUpdate};
    use crate::domain::foundation::{Timestamp, UserId, WebhookEventId};
    use rust_decimal::Decimal;

    fn payment(status: PaymentStatus) -> Payment {
        Payment::record(
            "pay_1",
            PaymentUpdate {
                status,
                amount: Decimal::new(1000, 2),
                currency: Currency::parse("EUR").unwrap(),
                user_id: UserId::new(),
                subscription_id: None,
                external_event_id: None,
                raw_payload_id: WebhookEventId::new(),
                paid_at: Timestamp::now(),
            },
        )
    }

    #[tokio::test]
    async fn unknown_payment_is_not_settled() {
        let index = PaymentDeduplicationIndex::new(Arc::new(InMemoryBillingStore::new()));
        assert!(!index.is_settled("pay_1").await.unwrap());
    }

    #[tokio::test]
    async fn pending_payment_is_not_settled() {
        let store = InMemoryBillingStore::new();
        store.seed_payment(payment(PaymentStatus::Pending)).await;
        let index = PaymentDeduplicationIndex::new(Arc::new(store));
        assert!(!index.is_settled("pay_1").await.unwrap());
    }

    #[tokio::test]
    async fn final_payments_are_settled() {
        for status in [
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::Chargeback,
        ] {
            let store = InMemoryBillingStore::new();
            store.seed_payment(payment(status)).await;
            let index = PaymentDeduplicationIndex::new(Arc::new(store));
            assert!(index.is_settled("pay_1").await.unwrap(), "{:?}", status);
        }
    }
}
