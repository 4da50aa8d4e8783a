//! IdempotencyLedger - first durable stop for every inbound notification.
//!
//! The ledger records a notification before any business logic runs and is
//! the only writer of status changes made outside the reconciliation
//! transaction (duplicate, ignored, failed, reclaimed).

use std::sync::Arc;

use chrono::Duration;

use crate::domain::billing::{WebhookEvent, WebhookEventStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, WebhookEventId};
use crate::ports::WebhookEventRepository;

/// Result of recording a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Stored event. For duplicates this is the row recorded first.
    pub event: WebhookEvent,
    pub is_duplicate: bool,
}

#[derive(Clone)]
pub struct IdempotencyLedger {
    repository: Arc<dyn WebhookEventRepository>,
}

impl IdempotencyLedger {
    pub fn new(repository: Arc<dyn WebhookEventRepository>) -> Self {
        Self { repository }
    }

    /// Records a notification, detecting a previous delivery of the same one.
    pub async fn record(&self, event: WebhookEvent) -> Result<LedgerRecord, DomainError> {
        let saved = self.repository.insert(&event).await?;
        let is_duplicate = saved.is_duplicate();
        Ok(LedgerRecord {
            event: saved.into_event(),
            is_duplicate,
        })
    }

    /// Claims a failed event for reprocessing.
    ///
    /// Returns `false` if the event is not failed anymore, i.e. another
    /// delivery got to it first. On success the passed event is reopened.
    pub async fn reclaim(&self, event: &mut WebhookEvent) -> Result<bool, DomainError> {
        let mut reopened = event.clone();
        reopened.reopen()?;

        if !self.repository.reclaim_failed(&event.id).await? {
            return Ok(false);
        }
        *event = reopened;
        Ok(true)
    }

    /// Claims a `received` event that has sat longer than `grace`.
    ///
    /// Such an event was abandoned mid-flight (crash, dropped request). Returns
    /// `false` if the event is younger than `grace`, not `received`, or was
    /// claimed by another delivery first.
    pub async fn reclaim_stale(
        &self,
        event: &mut WebhookEvent,
        grace: Duration,
    ) -> Result<bool, DomainError> {
        if event.status != WebhookEventStatus::Received {
            return Ok(false);
        }
        let now = Timestamp::now();
        let cutoff = now.plus(-grace);
        if event.received_at.is_after(&cutoff) {
            return Ok(false);
        }

        if !self.repository.reclaim_stale(&event.id, cutoff, now).await? {
            return Ok(false);
        }
        event.received_at = now;
        Ok(true)
    }

    pub async fn find(&self, id: &WebhookEventId) -> Result<WebhookEvent, DomainError> {
        self.repository.find_by_id(id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::WebhookEventNotFound, "Webhook event not found")
                .with_detail("webhook_event_id", id.to_string())
        })
    }

    pub async fn mark_duplicate(&self, event: &mut WebhookEvent) -> Result<(), DomainError> {
        event.mark_duplicate()?;
        self.repository.update_status(event).await
    }

    pub async fn mark_ignored(
        &self,
        event: &mut WebhookEvent,
        reason: impl Into<String>,
    ) -> Result<(), DomainError> {
        event.mark_ignored(reason)?;
        self.repository.update_status(event).await
    }

    pub async fn mark_failed(
        &self,
        event: &mut WebhookEvent,
        error: impl Into<String>,
    ) -> Result<(), DomainError> {
        event.mark_failed(error)?;
        self.repository.update_status(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use serde_json::json;

    fn event(external_id: Option<&str>) -> WebhookEvent {
        WebhookEvent::received(
            external_id.map(str::to_string),
            Some("pay_1".to_string()),
            "payment.succeeded",
            json!({"id": external_id}),
        )
    }

    fn ledger() -> (IdempotencyLedger, InMemoryBillingStore) {
        let store = InMemoryBillingStore::new();
        (IdempotencyLedger::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn first_delivery_is_not_duplicate() {
        let (ledger, store) = ledger();
        let record = ledger.record(event(Some("evt_1"))).await.unwrap();
        assert!(!record.is_duplicate);
        assert_eq!(store.webhook_events().await.len(), 1);
    }

    #[tokio::test]
    async fn second_delivery_returns_first_row() {
        let (ledger, store) = ledger();
        let first = ledger.record(event(Some("evt_1"))).await.unwrap();
        let second = ledger.record(event(Some("evt_1"))).await.unwrap();

        assert!(second.is_duplicate);
        assert_eq!(second.event.id, first.event.id);
        assert_eq!(store.webhook_events().await.len(), 1);
    }

    #[tokio::test]
    async fn events_without_id_are_never_duplicates() {
        let (ledger, store) = ledger();
        assert!(!ledger.record(event(None)).await.unwrap().is_duplicate);
        assert!(!ledger.record(event(None)).await.unwrap().is_duplicate);
        assert_eq!(store.webhook_events().await.len(), 2);
    }

    #[tokio::test]
    async fn mark_failed_persists_error() {
        let (ledger, _) = ledger();
        let mut stored = ledger.record(event(Some("evt_1"))).await.unwrap().event;
        ledger.mark_failed(&mut stored, "db down").await.unwrap();

        let found = ledger.find(&stored.id).await.unwrap();
        assert_eq!(found.status, WebhookEventStatus::Failed);
        assert_eq!(found.error_message.as_deref(), Some("db down"));
    }

    #[tokio::test]
    async fn reclaim_succeeds_once() {
        let (ledger, _) = ledger();
        let mut stored = ledger.record(event(Some("evt_1"))).await.unwrap().event;
        ledger.mark_failed(&mut stored, "db down").await.unwrap();

        let mut first = stored.clone();
        let mut second = stored.clone();
        assert!(ledger.reclaim(&mut first).await.unwrap());
        assert!(!ledger.reclaim(&mut second).await.unwrap());

        assert_eq!(first.status, WebhookEventStatus::Received);
        assert_eq!(second.status, WebhookEventStatus::Failed);
        let found = ledger.find(&stored.id).await.unwrap();
        assert_eq!(found.status, WebhookEventStatus::Received);
        assert!(found.error_message.is_none());
    }

    #[tokio::test]
    async fn reclaim_rejects_settled_event() {
        let (ledger, _) = ledger();
        let mut stored = ledger.record(event(Some("evt_1"))).await.unwrap().event;
        ledger.mark_duplicate(&mut stored).await.unwrap();

        let err = ledger.reclaim(&mut stored).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
    }

    #[tokio::test]
    async fn stale_received_event_is_claimed_once() {
        let (ledger, _) = ledger();
        let mut abandoned = event(Some("evt_1"));
        abandoned.received_at = Timestamp::now().plus(-Duration::minutes(10));
        let stored = ledger.record(abandoned).await.unwrap().event;

        let mut first = stored.clone();
        let mut second = stored.clone();
        assert!(ledger.reclaim_stale(&mut first, Duration::minutes(5)).await.unwrap());
        assert!(!ledger.reclaim_stale(&mut second, Duration::minutes(5)).await.unwrap());

        assert!(first.received_at.is_after(&stored.received_at));
        let found = ledger.find(&stored.id).await.unwrap();
        assert_eq!(found.status, WebhookEventStatus::Received);
        assert_eq!(found.received_at, first.received_at);
    }

    #[tokio::test]
    async fn fresh_received_event_is_not_claimed() {
        let (ledger, _) = ledger();
        let mut stored = ledger.record(event(Some("evt_1"))).await.unwrap().event;

        assert!(!ledger.reclaim_stale(&mut stored, Duration::minutes(5)).await.unwrap());
    }

    #[tokio::test]
    async fn stale_reclaim_skips_settled_event() {
        let (ledger, _) = ledger();
        let mut abandoned = event(Some("evt_1"));
        abandoned.received_at = Timestamp::now().plus(-Duration::minutes(10));
        let mut stored = ledger.record(abandoned).await.unwrap().event;
        ledger.mark_duplicate(&mut stored).await.unwrap();

        assert!(!ledger.reclaim_stale(&mut stored, Duration::minutes(5)).await.unwrap());
        assert_eq!(stored.status, WebhookEventStatus::Duplicate);
    }

    #[tokio::test]
    async fn find_unknown_event_is_not_found() {
        let (ledger, _) = ledger();
        let err = ledger.find(&WebhookEventId::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::WebhookEventNotFound);
    }
}
