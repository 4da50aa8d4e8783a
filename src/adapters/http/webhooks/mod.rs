//! HTTP adapter for the payment provider.
//!
//! - `POST /webhooks/payments` - Inbound payment notifications
//! - `GET /health` - Liveness check

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::WebhookResponse;
pub use handlers::WebhookAppState;
pub use routes::webhook_router;
