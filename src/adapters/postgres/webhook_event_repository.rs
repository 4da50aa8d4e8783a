//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The unique constraint on `webhook_events.external_event_id` is the
//! serialization point for concurrent deliveries of one notification.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};

use super::rows::{db_error, webhook_event_status_to_string, WebhookEventRow, WEBHOOK_EVENT_COLUMNS};
use crate::domain::billing::WebhookEvent;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, WebhookEventId};
use crate::ports::{SaveResult, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Writes the mutable columns of a webhook event.
///
/// Shared with the billing transaction so both paths write the same columns.
pub(super) async fn write_status<'e, E>(executor: E, event: &WebhookEvent) -> Result<(), DomainError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE webhook_events SET
            status = $2,
            error_message = $3,
            processed_at = $4
        WHERE id = $1
        "#,
    )
    .bind(event.id.as_uuid())
    .bind(webhook_event_status_to_string(&event.status))
    .bind(&event.error_message)
    .bind(event.processed_at.map(|t| *t.as_datetime()))
    .execute(executor)
    .await
    .map_err(db_error("update webhook event status"))?;

    if result.rows_affected() == 0 {
        return Err(
            DomainError::new(ErrorCode::WebhookEventNotFound, "Webhook event not found")
                .with_detail("webhook_event_id", event.id.to_string()),
        );
    }
    Ok(())
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn insert(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError> {
        let inserted: Option<WebhookEventRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO webhook_events (
                id, external_event_id, external_payment_id, event_type, payload,
                signature_valid, status, error_message, received_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (external_event_id) DO NOTHING
            RETURNING {}
            "#,
            WEBHOOK_EVENT_COLUMNS
        ))
        .bind(event.id.as_uuid())
        .bind(&event.external_event_id)
        .bind(&event.external_payment_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.signature_valid)
        .bind(webhook_event_status_to_string(&event.status))
        .bind(&event.error_message)
        .bind(event.received_at.as_datetime())
        .bind(event.processed_at.map(|t| *t.as_datetime()))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("insert webhook event"))?;

        if let Some(row) = inserted {
            return Ok(SaveResult::Inserted(row.try_into()?));
        }

        // Conflict: only possible when external_event_id is set.
        let existing: WebhookEventRow = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE external_event_id = $1",
            WEBHOOK_EVENT_COLUMNS
        ))
        .bind(&event.external_event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("load existing webhook event"))?;

        Ok(SaveResult::AlreadyExists(existing.try_into()?))
    }

    async fn find_by_id(&self, id: &WebhookEventId) -> Result<Option<WebhookEvent>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE id = $1",
            WEBHOOK_EVENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find webhook event"))?;

        row.map(WebhookEvent::try_from).transpose()
    }

    async fn update_status(&self, event: &WebhookEvent) -> Result<(), DomainError> {
        write_status(&self.pool, event).await
    }

    async fn reclaim_failed(&self, id: &WebhookEventId) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = 'received',
                error_message = NULL,
                processed_at = NULL
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error("reclaim webhook event"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn reclaim_stale(
        &self,
        id: &WebhookEventId,
        received_before: Timestamp,
        claimed_at: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                received_at = $3
            WHERE id = $1 AND status = 'received' AND received_at <= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(received_before.as_datetime())
        .bind(claimed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("reclaim stale webhook event"))?;

        Ok(result.rows_affected() == 1)
    }
}
