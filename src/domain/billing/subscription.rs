//! Subscription entity - a user's time-boxed access to a plan.
//!
//! # Design Decisions
//!
//! - **One active per plan**: at most one `Active` row per (user, plan)
//! - **Renewal extends**: paying again adds a full duration on top of what is
//!   left, or starts from now if the period already lapsed

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Computes the end of the period after paying for `duration` more.
///
/// Early renewals stack on top of the remaining time; late renewals start
/// from `now` so the customer never pays for a lapsed gap.
pub fn next_period_end(current_end: Timestamp, now: Timestamp, duration: Duration) -> Timestamp {
    current_end.later_of(now).plus(duration)
}

/// Access grant for one plan.
///
/// # Invariants
///
/// - `current_period_start <= current_period_end`
/// - At most one `Active` subscription per (`user_id`, `plan_id`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Starts a new active subscription running `duration` from `now`.
    pub fn start(
        user_id: UserId,
        plan_id: impl Into<String>,
        duration: Duration,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id,
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now.plus(duration),
            created_at: now,
            updated_at: now,
        }
    }

    /// Extends an active subscription by one more `duration`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the subscription is active.
    pub fn extend(&mut self, duration: Duration, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        if self.current_period_end.is_before(&now) {
            self.current_period_start = now;
        }
        self.current_period_end = next_period_end(self.current_period_end, now, duration);
        self.updated_at = now;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        use crate::domain::foundation::StateMachine;

        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
            .with_detail("subscription_id", self.id.to_string())
        })?;
        Ok(())
    }
}
