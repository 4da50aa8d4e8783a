//! Plan catalog backed by configuration.
//!
//! Plans are configured as a comma separated list of `plan=days` pairs,
//! for example `monthly=30,annual=365`.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};
use crate::ports::PlanCatalog;

pub const DEFAULT_PLAN_DURATIONS: &str = "monthly=30,annual=365";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredPlanCatalog {
    durations: HashMap<String, Duration>,
}

impl ConfiguredPlanCatalog {
    /// Parses a `plan=days,...` list.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty list, a malformed entry,
    /// a non-positive day count or a plan listed twice.
    pub fn parse(list: &str) -> Result<Self, ValidationError> {
        let mut durations = HashMap::new();

        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (plan, days) = entry.split_once('=').ok_or_else(|| {
                ValidationError::invalid_format("plan_durations", format!("expected plan=days, got '{}'", entry))
            })?;
            let plan = plan.trim();
            if plan.is_empty() {
                return Err(ValidationError::empty_field("plan_durations.plan"));
            }
            let days: i64 = days.trim().parse().map_err(|_| {
                ValidationError::invalid_format("plan_durations", format!("'{}' is not a day count", days.trim()))
            })?;
            if days <= 0 {
                return Err(ValidationError::invalid_format(
                    "plan_durations",
                    format!("plan '{}' must last at least one day", plan),
                ));
            }
            if durations.insert(plan.to_string(), Duration::days(days)).is_some() {
                return Err(ValidationError::invalid_format(
                    "plan_durations",
                    format!("plan '{}' listed twice", plan),
                ));
            }
        }

        if durations.is_empty() {
            return Err(ValidationError::empty_field("plan_durations"));
        }
        Ok(Self { durations })
    }

    pub fn plan_ids(&self) -> impl Iterator<Item = &str> {
        self.durations.keys().map(String::as_str)
    }
}

impl Default for ConfiguredPlanCatalog {
    fn default() -> Self {
        let durations = [
            ("monthly".to_string(), Duration::days(30)),
            ("annual".to_string(), Duration::days(365)),
        ];
        Self {
            durations: durations.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PlanCatalog for ConfiguredPlanCatalog {
    async fn get_duration(&self, plan_id: &str) -> Result<Duration, DomainError> {
        self.durations.get(plan_id).copied().ok_or_else(|| {
            DomainError::new(ErrorCode::UnknownPlan, format!("Unknown plan '{}'", plan_id))
                .with_detail("plan_id", plan_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_default_list() {
        assert_eq!(
            ConfiguredPlanCatalog::parse(DEFAULT_PLAN_DURATIONS).unwrap(),
            ConfiguredPlanCatalog::default()
        );
    }

    #[test]
    fn parses_entries_with_whitespace() {
        let catalog = ConfiguredPlanCatalog::parse(" weekly = 7 , quarterly=90,").unwrap();
        let mut plans: Vec<_> = catalog.plan_ids().collect();
        plans.sort();
        assert_eq!(plans, vec!["quarterly", "weekly"]);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(ConfiguredPlanCatalog::parse("monthly").is_err());
        assert!(ConfiguredPlanCatalog::parse("monthly=thirty").is_err());
        assert!(ConfiguredPlanCatalog::parse("monthly=0").is_err());
        assert!(ConfiguredPlanCatalog::parse("=30").is_err());
        assert!(ConfiguredPlanCatalog::parse("monthly=30,monthly=31").is_err());
        assert!(ConfiguredPlanCatalog::parse(" , ").is_err());
    }

    #[tokio::test]
    async fn returns_configured_duration() {
        let catalog = ConfiguredPlanCatalog::parse("weekly=7").unwrap();
        assert_eq!(catalog.get_duration("weekly").await.unwrap(), Duration::days(7));
    }

    #[tokio::test]
    async fn unknown_plan_is_an_error() {
        let err = ConfiguredPlanCatalog::default()
            .get_duration("lifetime")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownPlan);
    }
}
