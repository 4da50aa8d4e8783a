//! Webhook event status state machine.
//!
//! Tracks what happened to one recorded notification. The row itself is
//! immutable evidence; only the status (plus error and processed time) moves.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Lifecycle of a recorded inbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    /// Durably recorded, business logic not yet run.
    Received,

    /// Reconciliation transaction has started working on it.
    Validated,

    /// Reconciliation committed.
    Processed,

    /// Same notification or an already settled payment; nothing applied.
    Duplicate,

    /// Reconciliation failed and was rolled back. A resend may reclaim it.
    Failed,

    /// Event type the business intentionally does not act on.
    Ignored,
}

impl WebhookEventStatus {
    /// Returns true if the notification's effect has been fully decided.
    ///
    /// A resend of a notification in one of these states is acknowledged
    /// without running business logic again.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            WebhookEventStatus::Processed
                | WebhookEventStatus::Duplicate
                | WebhookEventStatus::Ignored
        )
    }

    /// Returns true if an operator may replay the stored payload.
    ///
    /// `Validated` is only ever written inside the reconciliation
    /// transaction, so a durable event is never observed in it.
    pub fn is_replayable(&self) -> bool {
        matches!(self, WebhookEventStatus::Received | WebhookEventStatus::Failed)
    }
}

impl StateMachine for WebhookEventStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use WebhookEventStatus::*;
        matches!(
            (self, target),
            (Received, Validated)
                | (Received, Duplicate)
                | (Received, Failed)
                | (Received, Ignored)
                | (Validated, Processed)
                | (Validated, Failed)
                // Reclaimed by a resend of the same notification
                | (Failed, Received)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use WebhookEventStatus::*;
        match self {
            Received => vec![Validated, Duplicate, Failed, Ignored],
            Validated => vec![Processed, Failed],
            Failed => vec![Received],
            Processed | Duplicate | Ignored => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WebhookEventStatus::*;

    const ALL: [WebhookEventStatus; 6] = [Received, Validated, Processed, Duplicate, Failed, Ignored];

    #[test]
    fn happy_path_is_received_validated_processed() {
        let status = Received.transition_to(Validated).unwrap();
        let status = status.transition_to(Processed).unwrap();
        assert_eq!(status, Processed);
    }

    #[test]
    fn received_can_become_duplicate_failed_or_ignored() {
        assert!(Received.can_transition_to(&Duplicate));
        assert!(Received.can_transition_to(&Failed));
        assert!(Received.can_transition_to(&Ignored));
    }

    #[test]
    fn validated_can_fail() {
        assert!(Validated.can_transition_to(&Failed));
    }

    #[test]
    fn cannot_skip_validation() {
        assert!(Received.transition_to(Processed).is_err());
    }

    #[test]
    fn failed_can_only_be_reclaimed() {
        assert_eq!(Failed.valid_transitions(), vec![Received]);
        assert!(Failed.transition_to(Processed).is_err());
    }

    #[test]
    fn settled_statuses_are_terminal() {
        for status in [Processed, Duplicate, Ignored] {
            assert!(status.is_terminal(), "{:?}", status);
            assert!(status.is_settled(), "{:?}", status);
            assert!(!status.is_replayable(), "{:?}", status);
        }
    }

    #[test]
    fn received_and_failed_are_replayable() {
        for status in [Received, Failed] {
            assert!(status.is_replayable(), "{:?}", status);
            assert!(!status.is_settled(), "{:?}", status);
        }
        assert!(!Validated.is_replayable());
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&Duplicate).unwrap(), "\"duplicate\"");
    }
}
