//! Billing domain - webhook events, payments, subscriptions and users.
//!
//! Everything the ingestion pipeline reasons about lives here: the three
//! status state machines, the entities they belong to, the typed view of an
//! inbound notification, and the outcome/error classification reported back
//! to the provider.

mod currency;
mod notification;
mod outcome;
mod payment;
mod payment_status;
mod subscription;
mod subscription_status;
mod user;
mod webhook_errors;
mod webhook_event;
mod webhook_event_status;

pub use currency::Currency;
pub use notification::{CustomerIdentity, NotificationData, PaymentNotification};
pub use outcome::{Acknowledgement, RejectionReason, WebhookOutcome};
pub use payment::{Payment, PaymentUpdate};
pub use payment_status::PaymentStatus;
pub use subscription::{next_period_end, Subscription};
pub use subscription_status::SubscriptionStatus;
pub use user::{normalize_email, User};
pub use webhook_errors::WebhookError;
pub use webhook_event::WebhookEvent;
pub use webhook_event_status::WebhookEventStatus;
