//! ReplayWebhookEventHandler - operator recovery for stuck or failed events.
//!
//! A notification whose processing crashed stays `received`; one whose
//! reconciliation failed is `failed`. If the provider never resends it, an
//! operator replays the stored payload through the same settlement pipeline.

use chrono::Duration;
use thiserror::Error;

use crate::domain::billing::{
    Acknowledgement, PaymentNotification, WebhookError, WebhookEventStatus,
};
use crate::domain::foundation::{ErrorCode, WebhookEventId};

use super::SettlementPipeline;

#[derive(Debug, Clone)]
pub struct ReplayWebhookEventCommand {
    pub webhook_event_id: WebhookEventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("Webhook event {0} not found")]
    NotFound(WebhookEventId),

    #[error("Webhook event is {0:?} and cannot be replayed")]
    NotReplayable(WebhookEventStatus),

    /// A `received` event younger than the grace period may still be in flight,
    /// or another delivery claimed it first.
    #[error("Webhook event was received too recently to replay")]
    StillInFlight,

    #[error("Stored payload is not a valid notification: {0}")]
    InvalidPayload(WebhookError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

pub struct ReplayWebhookEventHandler {
    settlement: SettlementPipeline,
    in_flight_grace: Duration,
}

impl ReplayWebhookEventHandler {
    pub fn new(settlement: SettlementPipeline, in_flight_grace: Duration) -> Self {
        Self {
            settlement,
            in_flight_grace,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReplayWebhookEventCommand,
    ) -> Result<Acknowledgement, ReplayError> {
        let ledger = self.settlement.ledger();
        let mut event = match ledger.find(&cmd.webhook_event_id).await {
            Ok(event) => event,
            Err(err) if err.code == ErrorCode::WebhookEventNotFound => {
                return Err(ReplayError::NotFound(cmd.webhook_event_id))
            }
            Err(err) => return Err(WebhookError::ledger(err).into()),
        };

        match event.status {
            WebhookEventStatus::Failed => {
                let claimed = ledger
                    .reclaim(&mut event)
                    .await
                    .map_err(WebhookError::ledger)?;
                if !claimed {
                    return Err(ReplayError::NotReplayable(event.status));
                }
            }
            WebhookEventStatus::Received => {
                let claimed = ledger
                    .reclaim_stale(&mut event, self.in_flight_grace)
                    .await
                    .map_err(WebhookError::ledger)?;
                if !claimed {
                    return Err(ReplayError::StillInFlight);
                }
            }
            status => return Err(ReplayError::NotReplayable(status)),
        }

        let notification =
            PaymentNotification::parse(&event.payload).map_err(ReplayError::InvalidPayload)?;

        tracing::info!(
            webhook_event_id = %event.id,
            external_event_id = ?event.external_event_id,
            "Replaying webhook event"
        );
        Ok(self.settlement.settle(event, &notification).await?)
    }
}
