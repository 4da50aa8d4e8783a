//! HTTP handlers for webhook endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::application::handlers::webhooks::{
    ReceivePaymentWebhookCommand, ReceivePaymentWebhookHandler,
};
use crate::domain::billing::WebhookOutcome;

use super::dto::{HealthResponse, WebhookResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for webhook endpoints.
#[derive(Clone)]
pub struct WebhookAppState {
    pub intake: Arc<ReceivePaymentWebhookHandler>,
    /// Header carrying the provider's signature.
    pub signature_header: String,
    /// How long the provider is kept waiting before it is told to retry.
    pub request_timeout: Duration,
}

impl WebhookAppState {
    pub fn new(
        intake: Arc<ReceivePaymentWebhookHandler>,
        signature_header: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            intake,
            signature_header: signature_header.into(),
            request_timeout,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/payments
///
/// The body is taken as raw bytes so the signature is checked against exactly
/// what the provider sent. Processing that outlives `request_timeout` keeps
/// running; the provider gets a 500 and its resend is acknowledged or resumes
/// the event once it is stale.
pub async fn receive_payment_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(state.signature_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = match ReceivePaymentWebhookCommand::from_raw(body.to_vec(), signature) {
        Ok(cmd) => cmd,
        Err(err) => {
            tracing::warn!(error = %err, "Rejected webhook with unparseable body");
            return respond(&err.outcome());
        }
    };

    // Detached from the request: a timeout or dropped connection must not
    // abandon an event halfway through settlement.
    let intake = Arc::clone(&state.intake);
    let work = tokio::spawn(async move { intake.handle(cmd).await });

    let outcome = match tokio::time::timeout(state.request_timeout, work).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Webhook processing task aborted");
            WebhookOutcome::RetryableFailure
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.request_timeout.as_millis() as u64,
                "Webhook processing exceeded request timeout, finishing in background"
            );
            WebhookOutcome::RetryableFailure
        }
    };

    respond(&outcome)
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

fn respond(outcome: &WebhookOutcome) -> (StatusCode, Json<WebhookResponse>) {
    (outcome.status_code(), Json(WebhookResponse::from(outcome)))
}
