//! webhook-ledger - idempotent ingestion of payment provider webhooks.
//!
//! Inbound notifications are validated, signature-checked and recorded in a
//! ledger keyed by the provider's notification id before any business state
//! changes. Reconciliation then updates users, subscriptions and payments in
//! one transaction, so resends and out-of-order deliveries settle exactly once.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
