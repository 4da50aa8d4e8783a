//! Webhook error types for payment notification intake.
//!
//! Every failure the intake pipeline can hit is classified here, together
//! with the HTTP status the provider sees and whether a retry can help.

use axum::http::StatusCode;
use thiserror::Error;

use super::{RejectionReason, WebhookOutcome};
use crate::domain::foundation::DomainError;

/// Errors that occur during webhook processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Body is not a notification document at all.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Required field missing from the notification.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Field present but unusable.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Signature header missing or not matching the body.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The notification could not be recorded.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Applying the notification failed and was rolled back.
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),
}

impl WebhookError {
    /// Wraps a storage error raised while recording or marking the event.
    pub fn ledger(err: DomainError) -> Self {
        WebhookError::Ledger(err.to_string())
    }

    /// Wraps an error raised inside the reconciliation transaction.
    pub fn reconciliation(err: DomainError) -> Self {
        WebhookError::Reconciliation(err.to_string())
    }

    /// Returns true if the provider should deliver this notification again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Ledger(_) | WebhookError::Reconciliation(_)
        )
    }

    /// Maps the error to the HTTP status code returned to the provider.
    ///
    /// - 4xx: the request itself is wrong, retrying will not help
    /// - 5xx: transient failure, the provider should retry
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MalformedPayload(_)
            | WebhookError::MissingField(_)
            | WebhookError::InvalidField { .. }
            | WebhookError::InvalidSignature => StatusCode::BAD_REQUEST,

            WebhookError::Ledger(_) | WebhookError::Reconciliation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Converts the error into the outcome reported to the caller.
    pub fn outcome(&self) -> WebhookOutcome {
        match self {
            WebhookError::InvalidSignature => {
                WebhookOutcome::Rejected(RejectionReason::InvalidSignature)
            }
            WebhookError::MalformedPayload(_)
            | WebhookError::MissingField(_)
            | WebhookError::InvalidField { .. } => {
                WebhookOutcome::Rejected(RejectionReason::MalformedPayload)
            }
            WebhookError::Ledger(_) | WebhookError::Reconciliation(_) => {
                WebhookOutcome::RetryableFailure
            }
        }
    }
}
