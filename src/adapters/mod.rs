//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application to external systems:
//! - `http` - Axum endpoints for the payment provider
//! - `memory` - In-process storage for tests and local runs
//! - `plans` - Plan durations from configuration
//! - `postgres` - PostgreSQL storage
//! - `signature` - HMAC-SHA256 webhook signatures

pub mod http;
pub mod memory;
pub mod plans;
pub mod postgres;
pub mod signature;

pub use memory::InMemoryBillingStore;
pub use plans::ConfiguredPlanCatalog;
pub use postgres::{PostgresBillingStore, PostgresPaymentReader, PostgresWebhookEventRepository};
pub use signature::HmacSha256Verifier;
