//! Response bodies returned to the payment provider.
//!
//! The provider only acts on the status code. Bodies carry a short result
//! label and never internal error detail.

use serde::Serialize;

use crate::domain::billing::{Acknowledgement, RejectionReason, WebhookOutcome};
use crate::domain::foundation::WebhookEventId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_event_id: Option<WebhookEventId>,
}

impl From<&WebhookOutcome> for WebhookResponse {
    fn from(outcome: &WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Accepted(ack) => {
                let result = match ack {
                    Acknowledgement::Processed { .. } => "processed",
                    Acknowledgement::DuplicateNotification { .. } => "duplicate",
                    Acknowledgement::PaymentAlreadySettled { .. } => "already_settled",
                    Acknowledgement::Ignored { .. } => "ignored",
                };
                Self {
                    result,
                    webhook_event_id: Some(ack.webhook_event_id()),
                }
            }
            WebhookOutcome::Rejected(reason) => Self {
                result: match reason {
                    RejectionReason::MalformedPayload => "malformed_payload",
                    RejectionReason::InvalidSignature => "invalid_signature",
                },
                webhook_event_id: None,
            },
            WebhookOutcome::RetryableFailure => Self {
                result: "retry",
                webhook_event_id: None,
            },
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
