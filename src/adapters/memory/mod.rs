//! In-memory adapters - storage ports without a database.

mod billing_store;

pub use billing_store::{FailPoint, InMemoryBillingStore, InMemoryBillingTransaction};
