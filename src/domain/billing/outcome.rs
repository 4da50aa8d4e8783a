//! Result of handling one inbound notification.

use axum::http::StatusCode;

use crate::domain::foundation::{PaymentId, SubscriptionId, WebhookEventId};

/// Why a notification was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Business state was updated.
    Processed {
        webhook_event_id: WebhookEventId,
        payment_id: PaymentId,
        subscription_id: Option<SubscriptionId>,
    },

    /// Same notification id was already recorded.
    DuplicateNotification { webhook_event_id: WebhookEventId },

    /// Notification was new, but its payment had already settled.
    PaymentAlreadySettled { webhook_event_id: WebhookEventId },

    /// Recorded, but intentionally not acted on.
    Ignored { webhook_event_id: WebhookEventId },
}

impl Acknowledgement {
    pub fn webhook_event_id(&self) -> WebhookEventId {
        match self {
            Acknowledgement::Processed {
                webhook_event_id, ..
            }
            | Acknowledgement::DuplicateNotification { webhook_event_id }
            | Acknowledgement::PaymentAlreadySettled { webhook_event_id }
            | Acknowledgement::Ignored { webhook_event_id } => *webhook_event_id,
        }
    }
}

/// Why a notification was refused. Nothing was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    MalformedPayload,
    InvalidSignature,
}

/// Outcome class reported back to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Safe for the provider to stop delivering.
    Accepted(Acknowledgement),

    /// Request is wrong; a retry of the same bytes will fail again.
    Rejected(RejectionReason),

    /// Transient failure; the provider should deliver again.
    RetryableFailure,
}

impl WebhookOutcome {
    /// Maps the outcome onto the provider-facing HTTP status.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookOutcome::Accepted(_) => StatusCode::OK,
            WebhookOutcome::Rejected(_) => StatusCode::BAD_REQUEST,
            WebhookOutcome::RetryableFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, WebhookOutcome::Accepted(_))
    }
}
