//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! - `PostgresWebhookEventRepository` - Idempotency ledger
//! - `PostgresPaymentReader` - Pre-transaction payment lookups
//! - `PostgresBillingStore` - Locked, atomic reconciliation writes

mod billing_store;
mod payment_reader;
mod rows;
mod webhook_event_repository;

pub use billing_store::{PostgresBillingStore, PostgresBillingTransaction};
pub use payment_reader::PostgresPaymentReader;
pub use webhook_event_repository::PostgresWebhookEventRepository;
