//! Subscription status state machine.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Status of a user's access grant for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created but not yet paid for.
    Pending,

    /// Access granted until `current_period_end`.
    Active,

    /// Period ended without renewal. Set by the expiry job, not by webhooks.
    Expired,

    /// Canceled by the user or an operator.
    Canceled,
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            (Pending, Active)
                | (Active, Active) // Renewal
                | (Active, Expired)
                | (Active, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Pending => vec![Active],
            Active => vec![Active, Expired, Canceled],
            Expired | Canceled => vec![],
        }
    }
}
