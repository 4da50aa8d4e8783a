//! WebhookEvent entity - the durable record of one inbound notification.
//!
//! A webhook event is written before any business logic runs and is never
//! deleted. Only `status`, `error_message` and `processed_at` change after
//! the initial insert.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, WebhookEventId};
use serde::{Deserialize, Serialize};

use super::WebhookEventStatus;

/// Recorded inbound notification.
///
/// # Invariants
///
/// - `external_event_id` is unique across all events when present
/// - `payload` is stored verbatim as received
/// - Status changes follow the `WebhookEventStatus` state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Internal identifier.
    pub id: WebhookEventId,

    /// Provider's notification id. Natural key for deduplication.
    pub external_event_id: Option<String>,

    /// Provider's payment id the notification talks about. Not unique.
    pub external_payment_id: Option<String>,

    /// Provider event type, e.g. `payment.succeeded`.
    pub event_type: String,

    /// Parsed request body as received.
    pub payload: serde_json::Value,

    /// Whether the signature check passed. Only verified events are recorded.
    pub signature_valid: bool,

    /// Processing status.
    pub status: WebhookEventStatus,

    /// Failure or ignore reason, if any.
    pub error_message: Option<String>,

    /// When the notification first arrived.
    pub received_at: Timestamp,

    /// When reconciliation committed.
    pub processed_at: Option<Timestamp>,
}

impl WebhookEvent {
    /// Creates a freshly received, signature-verified event.
    pub fn received(
        external_event_id: Option<String>,
        external_payment_id: Option<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: WebhookEventId::new(),
            external_event_id,
            external_payment_id,
            event_type: event_type.into(),
            payload,
            signature_valid: true,
            status: WebhookEventStatus::Received,
            error_message: None,
            received_at: Timestamp::now(),
            processed_at: None,
        }
    }

    /// Marks that the reconciliation transaction has picked the event up.
    pub fn mark_validated(&mut self) -> Result<(), DomainError> {
        self.transition_to(WebhookEventStatus::Validated)
    }

    /// Marks the event as fully applied.
    pub fn mark_processed(&mut self, at: Timestamp) -> Result<(), DomainError> {
        self.transition_to(WebhookEventStatus::Processed)?;
        self.processed_at = Some(at);
        Ok(())
    }

    /// Marks the event as a duplicate of work already applied.
    pub fn mark_duplicate(&mut self) -> Result<(), DomainError> {
        self.transition_to(WebhookEventStatus::Duplicate)
    }

    /// Marks the event as failed, keeping the error for operators.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(WebhookEventStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    /// Marks the event as intentionally not acted upon.
    pub fn mark_ignored(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(WebhookEventStatus::Ignored)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Reopens a failed event so a resend can process it again.
    pub fn reopen(&mut self) -> Result<(), DomainError> {
        self.transition_to(WebhookEventStatus::Received)?;
        self.error_message = None;
        self.processed_at = None;
        Ok(())
    }

    fn transition_to(&mut self, target: WebhookEventStatus) -> Result<(), DomainError> {
        use crate::domain::foundation::StateMachine;

        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition webhook event from {:?} to {:?}",
                    self.status, target
                ),
            )
            .with_detail("webhook_event_id", self.id.to_string())
        })?;
        Ok(())
    }
}
