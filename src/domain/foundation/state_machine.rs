//! State machine trait for status enums.
//!
//! Webhook events, payments and subscriptions each move through a small
//! lifecycle. The trait keeps the legal edges next to the enum and gives
//! every status a checked `transition_to`.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for PaymentStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!((self, target), (Pending, Succeeded) | (Succeeded, Refunded))
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> { /* ... */ }
/// }
///
/// let next = payment.status.transition_to(PaymentStatus::Succeeded)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state has no outgoing transitions.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Delivery {
        Queued,
        Sent,
        Bounced,
        Delivered,
    }

    impl StateMachine for Delivery {
        fn can_transition_to(&self, target: &Self) -> bool {
            use Delivery::*;
            matches!(
                (self, target),
                (Queued, Queued) | (Queued, Sent) | (Sent, Bounced) | (Sent, Delivered)
            )
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use Delivery::*;
            match self {
                Queued => vec![Queued, Sent],
                Sent => vec![Bounced, Delivered],
                Bounced | Delivered => vec![],
            }
        }
    }

    #[test]
    fn self_loop_is_allowed_when_declared() {
        assert_eq!(
            Delivery::Queued.transition_to(Delivery::Queued),
            Ok(Delivery::Queued)
        );
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let err = Delivery::Queued
            .transition_to(Delivery::Delivered)
            .unwrap_err();
        assert!(err.to_string().contains("Queued"));
        assert!(err.to_string().contains("Delivered"));
    }

    #[test]
    fn leaves_are_terminal() {
        assert!(Delivery::Bounced.is_terminal());
        assert!(Delivery::Delivered.is_terminal());
        assert!(!Delivery::Sent.is_terminal());
    }

    #[test]
    fn can_transition_to_agrees_with_valid_transitions() {
        let all = [
            Delivery::Queued,
            Delivery::Sent,
            Delivery::Bounced,
            Delivery::Delivered,
        ];
        for from in all {
            for to in all {
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
}
