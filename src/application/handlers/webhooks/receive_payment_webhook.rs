//! ReceivePaymentWebhookHandler - Command handler for inbound payment notifications.
//!
//! Every step is a hard gate:
//!
//! 1. Shape validation (nothing persisted on failure)
//! 2. Signature verification over the raw body (nothing persisted on failure)
//! 3. Ledger insert; a resend of a known notification stops here unless the
//!    stored event failed or was abandoned while `received`
//! 4. Settlement: event-type filter, payment dedup, reconciliation

use std::sync::Arc;

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::billing::{
    Acknowledgement, PaymentNotification, WebhookError, WebhookEvent, WebhookEventStatus,
    WebhookOutcome,
};
use crate::ports::SignatureVerifier;

use super::SettlementPipeline;

/// Command carrying one inbound notification.
#[derive(Debug, Clone)]
pub struct ReceivePaymentWebhookCommand {
    /// Exact bytes received. The signature covers these, not `document`.
    pub raw_body: Vec<u8>,
    /// Signature header value, if the request had one.
    pub signature: Option<String>,
    /// Parsed body.
    pub document: serde_json::Value,
}

impl ReceivePaymentWebhookCommand {
    /// Builds a command from the raw request body.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` if the body is not JSON.
    pub fn from_raw(raw_body: Vec<u8>, signature: Option<String>) -> Result<Self, WebhookError> {
        let document = serde_json::from_slice(&raw_body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        Ok(Self {
            raw_body,
            signature,
            document,
        })
    }
}

/// Handler for inbound payment notifications.
pub struct ReceivePaymentWebhookHandler {
    settlement: SettlementPipeline,
    verifier: Arc<dyn SignatureVerifier>,
    signing_secret: SecretString,
    /// Age after which a `received` event counts as abandoned.
    stale_after: Duration,
}

impl ReceivePaymentWebhookHandler {
    pub fn new(
        settlement: SettlementPipeline,
        verifier: Arc<dyn SignatureVerifier>,
        signing_secret: SecretString,
        stale_after: Duration,
    ) -> Self {
        Self {
            settlement,
            verifier,
            signing_secret,
            stale_after,
        }
    }

    pub async fn handle(&self, cmd: ReceivePaymentWebhookCommand) -> WebhookOutcome {
        match self.process(cmd).await {
            Ok(acknowledgement) => WebhookOutcome::Accepted(acknowledgement),
            Err(err) => err.outcome(),
        }
    }

    async fn process(
        &self,
        cmd: ReceivePaymentWebhookCommand,
    ) -> Result<Acknowledgement, WebhookError> {
        // 1. Shape
        let notification = PaymentNotification::parse(&cmd.document).map_err(|err| {
            tracing::warn!(error = %err, "Rejected malformed webhook");
            err
        })?;

        // 2. Signature
        let verified = cmd.signature.as_deref().is_some_and(|signature| {
            self.verifier.verify(
                &cmd.raw_body,
                signature,
                self.signing_secret.expose_secret(),
            )
        });
        if !verified {
            tracing::warn!(
                external_event_id = ?notification.id,
                signature_present = cmd.signature.is_some(),
                "Rejected webhook with invalid signature"
            );
            return Err(WebhookError::InvalidSignature);
        }

        // 3. Ledger
        let event = WebhookEvent::received(
            notification.id.clone(),
            Some(notification.data.payment_id.clone()),
            notification.event_type.clone(),
            cmd.document,
        );
        let ledger = self.settlement.ledger();
        let record = ledger.record(event).await.map_err(|err| {
            tracing::error!(
                external_event_id = ?notification.id,
                error = %err,
                "Could not record webhook event"
            );
            WebhookError::ledger(err)
        })?;

        let mut event = record.event;
        if record.is_duplicate {
            let reclaimed = match event.status {
                WebhookEventStatus::Failed => ledger.reclaim(&mut event).await,
                WebhookEventStatus::Received => {
                    ledger.reclaim_stale(&mut event, self.stale_after).await
                }
                _ => Ok(false),
            }
            .map_err(WebhookError::ledger)?;
            if !reclaimed {
                tracing::info!(
                    webhook_event_id = %event.id,
                    external_event_id = ?event.external_event_id,
                    status = ?event.status,
                    "Duplicate webhook notification acknowledged"
                );
                return Ok(Acknowledgement::DuplicateNotification {
                    webhook_event_id: event.id,
                });
            }
            tracing::info!(
                webhook_event_id = %event.id,
                external_event_id = ?event.external_event_id,
                status = ?event.status,
                "Reclaimed webhook event for reprocessing"
            );
        }

        // 4. Settlement
        self.settlement.settle(event, &notification).await
    }
}
