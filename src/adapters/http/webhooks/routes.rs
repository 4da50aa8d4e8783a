//! Axum router configuration for webhook endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{health, receive_payment_webhook, WebhookAppState};

/// Create the webhook router.
///
/// No timeout layer: the webhook handler enforces its own deadline without
/// cancelling settlement.
///
/// # Routes
/// - `POST /webhooks/payments` - Handle payment provider notifications
/// - `GET /health` - Liveness check
pub fn webhook_router(state: WebhookAppState) -> Router {
    Router::new()
        .route("/webhooks/payments", post(receive_payment_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
