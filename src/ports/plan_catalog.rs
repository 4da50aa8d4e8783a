//! PlanCatalog port - how long a payment for a plan grants access.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::foundation::DomainError;

#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// Returns the access duration bought by one payment for `plan_id`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlan` if the catalog has no such plan.
    async fn get_duration(&self, plan_id: &str) -> Result<Duration, DomainError>;
}
