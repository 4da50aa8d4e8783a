//! Plan catalog adapters.

mod configured_plan_catalog;

pub use configured_plan_catalog::{ConfiguredPlanCatalog, DEFAULT_PLAN_DURATIONS};
