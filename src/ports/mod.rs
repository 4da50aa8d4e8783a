//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `WebhookEventRepository` - Idempotency ledger of inbound notifications
//! - `PaymentReader` - Pre-transaction payment lookups
//! - `BillingStore` / `BillingTransaction` - Atomic reconciliation writes
//!
//! ## Collaborator Ports
//!
//! - `SignatureVerifier` - Request authenticity
//! - `PlanCatalog` - Plan durations

mod billing_store;
mod payment_reader;
mod plan_catalog;
mod signature_verifier;
mod webhook_event_repository;

pub use billing_store::{BillingStore, BillingTransaction};
pub use payment_reader::PaymentReader;
pub use plan_catalog::PlanCatalog;
pub use signature_verifier::SignatureVerifier;
pub use webhook_event_repository::{SaveResult, WebhookEventRepository};
