//! SettlementPipeline - everything that happens to a recorded notification.
//!
//! Shared by live intake and operator replay: event-type filter, payment
//! duplicate check, reconciliation, and the ledger marking for each result.

use crate::domain::billing::{Acknowledgement, PaymentNotification, WebhookError, WebhookEvent};

use super::{IdempotencyLedger, PaymentDeduplicationIndex, Reconciliation, ReconciliationEngine};

#[derive(Clone)]
pub struct SettlementPipeline {
    ledger: IdempotencyLedger,
    dedup: PaymentDeduplicationIndex,
    engine: ReconciliationEngine,
}

impl SettlementPipeline {
    pub fn new(
        ledger: IdempotencyLedger,
        dedup: PaymentDeduplicationIndex,
        engine: ReconciliationEngine,
    ) -> Self {
        Self {
            ledger,
            dedup,
            engine,
        }
    }

    pub fn ledger(&self) -> &IdempotencyLedger {
        &self.ledger
    }

    /// Settles a `received` event.
    ///
    /// # Errors
    ///
    /// `Ledger` if a status update could not be written, `Reconciliation` if
    /// the business transaction failed. In the latter case the event has
    /// been marked `failed` (best effort).
    pub async fn settle(
        &self,
        mut event: WebhookEvent,
        notification: &PaymentNotification,
    ) -> Result<Acknowledgement, WebhookError> {
        let webhook_event_id = event.id;
        let payment_id = notification.data.payment_id.as_str();

        if notification.payment_status().is_none() {
            let reason = format!("Unsupported event type '{}'", notification.event_type);
            self.ledger
                .mark_ignored(&mut event, reason)
                .await
                .map_err(WebhookError::ledger)?;
            tracing::info!(
                webhook_event_id = %webhook_event_id,
                event_type = %notification.event_type,
                "Ignored webhook with unsupported event type"
            );
            return Ok(Acknowledgement::Ignored { webhook_event_id });
        }

        let settled = match self.dedup.is_settled(payment_id).await {
            Ok(settled) => settled,
            Err(err) => return Err(self.fail(event, WebhookError::ledger(err)).await),
        };
        if settled {
            return self.already_settled(event, payment_id).await;
        }

        match self.engine.reconcile(&event, notification).await {
            Ok(Reconciliation::Applied {
                payment_id: applied_payment_id,
                subscription_id,
                ..
            }) => {
                tracing::info!(
                    webhook_event_id = %webhook_event_id,
                    external_payment_id = %payment_id,
                    event_type = %notification.event_type,
                    "Processed payment webhook"
                );
                Ok(Acknowledgement::Processed {
                    webhook_event_id,
                    payment_id: applied_payment_id,
                    subscription_id,
                })
            }
            Ok(Reconciliation::AlreadySettled) => self.already_settled(event, payment_id).await,
            Ok(Reconciliation::RejectedTransition { reason }) => {
                tracing::warn!(
                    webhook_event_id = %webhook_event_id,
                    external_payment_id = %payment_id,
                    reason = %reason,
                    "Ignored webhook with illegal payment transition"
                );
                self.ledger
                    .mark_ignored(&mut event, reason)
                    .await
                    .map_err(WebhookError::ledger)?;
                Ok(Acknowledgement::Ignored { webhook_event_id })
            }
            Err(err) => Err(self.fail(event, WebhookError::reconciliation(err)).await),
        }
    }

    async fn already_settled(
        &self,
        mut event: WebhookEvent,
        payment_id: &str,
    ) -> Result<Acknowledgement, WebhookError> {
        let webhook_event_id = event.id;
        self.ledger
            .mark_duplicate(&mut event)
            .await
            .map_err(WebhookError::ledger)?;
        tracing::info!(
            webhook_event_id = %webhook_event_id,
            external_payment_id = %payment_id,
            "Payment already settled, webhook marked duplicate"
        );
        Ok(Acknowledgement::PaymentAlreadySettled { webhook_event_id })
    }

    /// Records the failure on the event and hands the error back.
    async fn fail(&self, mut event: WebhookEvent, error: WebhookError) -> WebhookError {
        tracing::error!(
            webhook_event_id = %event.id,
            external_event_id = ?event.external_event_id,
            error = %error,
            "Webhook processing failed"
        );
        if let Err(mark_err) = self.ledger.mark_failed(&mut event, error.to_string()).await {
            tracing::error!(
                webhook_event_id = %event.id,
                error = %mark_err,
                "Could not mark webhook event failed"
            );
        }
        error
    }
}
