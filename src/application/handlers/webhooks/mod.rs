//! Payment webhook ingestion handlers.
//!
//! Data flow for one notification:
//!
//! ```text
//! intake ──► ledger (durable record) ──► payment dedup ──► reconciliation ──► ledger status
//! ```

mod idempotency_ledger;
mod payment_dedup;
mod receive_payment_webhook;
mod reconcile_payment_event;
mod replay_webhook_event;
mod settlement;

pub use idempotency_ledger::{IdempotencyLedger, LedgerRecord};
pub use payment_dedup::PaymentDeduplicationIndex;
pub use receive_payment_webhook::{ReceivePaymentWebhookCommand, ReceivePaymentWebhookHandler};
pub use reconcile_payment_event::{Reconciliation, ReconciliationEngine};
pub use replay_webhook_event::{
    ReplayError, ReplayWebhookEventCommand, ReplayWebhookEventHandler,
};
pub use settlement::SettlementPipeline;
