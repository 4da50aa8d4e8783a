//! PostgreSQL implementation of PaymentReader.

use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::{db_error, PaymentRow, PAYMENT_COLUMNS};
use crate::domain::billing::Payment;
use crate::domain::foundation::DomainError;
use crate::ports::PaymentReader;

pub struct PostgresPaymentReader {
    pool: PgPool,
}

impl PostgresPaymentReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentReader for PostgresPaymentReader {
    async fn find_by_external_payment_id(
        &self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE external_payment_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(external_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find payment"))?;

        row.map(Payment::try_from).transpose()
    }
}
