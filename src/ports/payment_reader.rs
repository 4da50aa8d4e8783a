//! PaymentReader port - read-only payment lookups outside a transaction.

use async_trait::async_trait;

use crate::domain::billing::Payment;
use crate::domain::foundation::DomainError;

/// Reader port for payments.
///
/// Used for the cheap pre-transaction duplicate check. The answer may be
/// stale by the time the reconciliation transaction runs, which re-checks
/// under a lock.
#[async_trait]
pub trait PaymentReader: Send + Sync {
    /// Finds the payment with this provider payment id.
    async fn find_by_external_payment_id(
        &self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError>;
}
