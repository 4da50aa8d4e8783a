//! WebhookEventRepository port - durable record of every inbound notification.
//!
//! The ledger writes here outside of any business transaction, so a
//! notification is on record even if everything after it fails.
//!
//! ## Why Webhook Idempotency Matters
//!
//! Payment providers may deliver the same notification multiple times due to:
//! - Network timeouts
//! - A 5xx response from our endpoint (triggers retry)
//! - Our endpoint returning success but the provider never seeing it
//!
//! The insert is keyed on `external_event_id` so that only one delivery of a
//! given notification ever runs business logic.

use async_trait::async_trait;

use crate::domain::billing::WebhookEvent;
use crate::domain::foundation::{DomainError, Timestamp, WebhookEventId};

/// Result of attempting to record a webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveResult {
    /// First time seeing this notification. Carries the stored event.
    Inserted(WebhookEvent),
    /// A row with the same `external_event_id` exists. Carries that row.
    AlreadyExists(WebhookEvent),
}

impl SaveResult {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SaveResult::AlreadyExists(_))
    }

    pub fn into_event(self) -> WebhookEvent {
        match self {
            SaveResult::Inserted(event) | SaveResult::AlreadyExists(event) => event,
        }
    }
}

/// Port for the webhook event ledger.
///
/// Implementations must use a unique constraint on `external_event_id`
/// (`ON CONFLICT DO NOTHING`) so concurrent deliveries cannot both insert.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Records a newly received event.
    ///
    /// Returns `AlreadyExists` with the stored row instead of an error when
    /// the notification id is taken. Events without an `external_event_id`
    /// are always inserted.
    async fn insert(&self, event: &WebhookEvent) -> Result<SaveResult, DomainError>;

    /// Finds an event by internal id.
    async fn find_by_id(&self, id: &WebhookEventId) -> Result<Option<WebhookEvent>, DomainError>;

    /// Persists `status`, `error_message` and `processed_at` of an event.
    ///
    /// # Errors
    ///
    /// Returns `WebhookEventNotFound` if no row has this id.
    async fn update_status(&self, event: &WebhookEvent) -> Result<(), DomainError>;

    /// Moves a `failed` event back to `received`.
    ///
    /// Compare-and-swap: returns `false` if the event was not `failed` at the
    /// time of the update, which means another delivery already claimed it.
    async fn reclaim_failed(&self, id: &WebhookEventId) -> Result<bool, DomainError>;

    /// Takes over a `received` event that arrived at or before `received_before`.
    ///
    /// Compare-and-swap like `reclaim_failed`. On success `received_at` is
    /// moved to `claimed_at`, so a concurrent delivery sees a fresh event and
    /// backs off.
    async fn reclaim_stale(
        &self,
        id: &WebhookEventId,
        received_before: Timestamp,
        claimed_at: Timestamp,
    ) -> Result<bool, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn already_exists_is_duplicate() {
        let event = WebhookEvent::received(Some("evt_1".to_string()), None, "payment.succeeded", json!({}));
        assert!(!SaveResult::Inserted(event.clone()).is_duplicate());
        assert!(SaveResult::AlreadyExists(event.clone()).is_duplicate());
        assert_eq!(SaveResult::AlreadyExists(event.clone()).into_event(), event);
    }
}
