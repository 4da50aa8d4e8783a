//! Payment status state machine and event-type mapping.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Outcome of one payment attempt as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Provider acknowledged the attempt; outcome unknown.
    Pending,

    /// Funds captured.
    Succeeded,

    /// Attempt declined or errored.
    Failed,

    /// Captured funds returned to the customer.
    Refunded,

    /// Customer disputed the charge with their bank.
    Chargeback,
}

impl PaymentStatus {
    /// Maps a provider event type onto the payment status it reports.
    ///
    /// Returns `None` for event types this pipeline does not act on.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "payment.created" | "payment.pending" | "payment.processing" => {
                Some(PaymentStatus::Pending)
            }
            "payment.succeeded" | "payment.completed" => Some(PaymentStatus::Succeeded),
            "payment.failed" | "payment.canceled" => Some(PaymentStatus::Failed),
            "payment.refunded" => Some(PaymentStatus::Refunded),
            "payment.chargeback" | "payment.disputed" => Some(PaymentStatus::Chargeback),
            _ => None,
        }
    }

    /// Returns true once business logic must not be re-applied for this payment.
    ///
    /// Every status except `Pending` counts, including `Succeeded`, even though
    /// a succeeded payment can still move to refunded or chargeback.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if this status grants the customer access to their plan.
    pub fn grants_access(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded)
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Pending)
                | (Pending, Succeeded)
                | (Pending, Failed)
                | (Succeeded, Refunded)
                | (Succeeded, Chargeback)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Pending, Succeeded, Failed],
            Succeeded => vec![Refunded, Chargeback],
            Failed | Refunded | Chargeback => vec![],
        }
    }
}
