//! Typed view of an inbound payment notification.
//!
//! The provider posts a JSON document shaped like
//!
//! ```json
//! {
//!   "id": "evt_123",
//!   "eventType": "payment.succeeded",
//!   "data": {
//!     "paymentId": "pay_456",
//!     "amount": "19.99",
//!     "currency": "usd",
//!     "customerEmail": "jane@example.com",
//!     "customerId": "cus_789",
//!     "planId": "monthly",
//!     "paidAt": "2025-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! `id`, `planId` and `paidAt` are optional, except that an event granting
//! access (`payment.succeeded`) must name its plan. At least one of
//! `customerEmail` and `customerId` must be present.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use super::{normalize_email, Currency, PaymentStatus, WebhookError};
use crate::domain::foundation::Timestamp;

/// `payments.amount` is NUMERIC(12, 2).
const MAX_AMOUNT_INTEGER_DIGITS: u32 = 10;

/// How the notification identifies the paying customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerIdentity {
    /// Normalized email address. Preferred when the provider sends one.
    Email(String),

    /// Provider's customer id.
    ExternalId(String),
}

/// Business fields of a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationData {
    pub payment_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub customer: CustomerIdentity,
    pub plan_id: Option<String>,
    pub paid_at: Option<Timestamp>,
}

/// Shape-validated notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotification {
    /// Provider notification id, when sent.
    pub id: Option<String>,
    pub event_type: String,
    pub data: NotificationData,
}

impl PaymentNotification {
    /// Validates the document shape and extracts typed fields.
    ///
    /// # Errors
    ///
    /// - `MalformedPayload` if the body is not an object
    /// - `MissingField` for an absent `eventType`, `data` or required data field,
    ///   including `planId` on an access-granting event
    /// - `InvalidField` for a field of the wrong type or format
    pub fn parse(document: &Value) -> Result<Self, WebhookError> {
        let root = document
            .as_object()
            .ok_or_else(|| WebhookError::MalformedPayload("body is not a JSON object".to_string()))?;

        let event_type = required_string(root, "eventType")?;
        let data = match root.get("data") {
            Some(Value::Object(data)) => data,
            None | Some(Value::Null) => return Err(WebhookError::MissingField("data")),
            Some(_) => return Err(invalid("data", "expected an object")),
        };
        let id = optional_identifier(root, "id")?;

        let payment_id = optional_identifier(data, "paymentId")?
            .ok_or(WebhookError::MissingField("paymentId"))?;
        let amount = parse_amount(data.get("amount"))?;
        let currency = Currency::parse(&required_string(data, "currency")?)
            .map_err(|e| invalid("currency", e.to_string()))?;

        let customer_email = optional_string(data, "customerEmail")?;
        let customer_id = optional_identifier(data, "customerId")?;
        let customer = match (customer_email, customer_id) {
            (Some(email), _) => {
                if !email.contains('@') {
                    return Err(invalid("customerEmail", "expected an email address"));
                }
                CustomerIdentity::Email(normalize_email(&email))
            }
            (None, Some(customer_id)) => CustomerIdentity::ExternalId(customer_id),
            (None, None) => return Err(WebhookError::MissingField("customerEmail or customerId")),
        };

        let plan_id = optional_string(data, "planId")?;
        let grants_access =
            PaymentStatus::from_event_type(&event_type).is_some_and(|s| s.grants_access());
        if grants_access && plan_id.is_none() {
            return Err(WebhookError::MissingField("planId"));
        }
        let paid_at = parse_paid_at(data.get("paidAt"))?;

        Ok(Self {
            id,
            event_type,
            data: NotificationData {
                payment_id,
                amount,
                currency,
                customer,
                plan_id,
                paid_at,
            },
        })
    }

    /// Payment status this notification reports, if the event type is known.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_event_type(&self.event_type)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> WebhookError {
    WebhookError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, WebhookError> {
    optional_string(object, field)?.ok_or(WebhookError::MissingField(field))
}

/// Absent, null and blank strings all read as `None`.
fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, WebhookError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(_) => Err(invalid(field, "expected a string")),
    }
}

/// Like `optional_string`, but also accepts integer identifiers.
fn optional_identifier(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, WebhookError> {
    match object.get(field) {
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        _ => optional_string(object, field),
    }
}

fn parse_amount(value: Option<&Value>) -> Result<Decimal, WebhookError> {
    let text = match value {
        None | Some(Value::Null) => return Err(WebhookError::MissingField("amount")),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(invalid("amount", "expected a number")),
    };

    let mut amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| invalid("amount", "not a decimal number"))?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(invalid("amount", "must not be negative"));
    }
    if amount.normalize().scale() > 2 {
        return Err(invalid("amount", "at most two fractional digits allowed"));
    }
    if amount.trunc() >= Decimal::from(10_i64.pow(MAX_AMOUNT_INTEGER_DIGITS)) {
        return Err(invalid("amount", "too large"));
    }
    amount.rescale(2);
    Ok(amount)
}

fn parse_paid_at(value: Option<&Value>) -> Result<Option<Timestamp>, WebhookError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Some(Timestamp::from_datetime(dt.with_timezone(&Utc))))
            .map_err(|e| invalid("paidAt", e.to_string())),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|dt| Some(Timestamp::from_datetime(dt)))
            .ok_or_else(|| invalid("paidAt", "expected unix seconds")),
        Some(_) => Err(invalid("paidAt", "expected an RFC 3339 timestamp")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "id": "evt_1",
            "eventType": "payment.succeeded",
            "data": {
                "paymentId": "pay_1",
                "amount": "19.99",
                "currency": "usd",
                "customerEmail": " Jane@Example.com ",
                "planId": "monthly",
                "paidAt": "2025-01-01T12:00:00Z"
            }
        })
    }

    // ══════════════════════════════════════════════════════════════
    // Happy Path
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_full_notification() {
        let n = PaymentNotification::parse(&valid_document()).unwrap();
        assert_eq!(n.id.as_deref(), Some("evt_1"));
        assert_eq!(n.event_type, "payment.succeeded");
        assert_eq!(n.data.payment_id, "pay_1");
        assert_eq!(n.data.amount, Decimal::from_str("19.99").unwrap());
        assert_eq!(n.data.currency.as_str(), "USD");
        assert_eq!(
            n.data.customer,
            CustomerIdentity::Email("jane@example.com".to_string())
        );
        assert_eq!(n.data.plan_id.as_deref(), Some("monthly"));
        assert!(n.data.paid_at.is_some());
        assert_eq!(n.payment_status(), Some(PaymentStatus::Succeeded));
    }

    #[test]
    fn id_is_optional() {
        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("id");
        let n = PaymentNotification::parse(&doc).unwrap();
        assert!(n.id.is_none());
    }

    #[test]
    fn numeric_amount_is_scaled_to_cents() {
        let mut doc = valid_document();
        doc["data"]["amount"] = json!(10);
        let n = PaymentNotification::parse(&doc).unwrap();
        assert_eq!(n.data.amount.to_string(), "10.00");
    }

    #[test]
    fn customer_id_used_when_email_absent() {
        let mut doc = valid_document();
        doc["data"].as_object_mut().unwrap().remove("customerEmail");
        doc["data"]["customerId"] = json!("cus_9");
        let n = PaymentNotification::parse(&doc).unwrap();
        assert_eq!(n.data.customer, CustomerIdentity::ExternalId("cus_9".to_string()));
    }

    #[test]
    fn email_wins_over_customer_id() {
        let mut doc = valid_document();
        doc["data"]["customerId"] = json!("cus_9");
        let n = PaymentNotification::parse(&doc).unwrap();
        assert!(matches!(n.data.customer, CustomerIdentity::Email(_)));
    }

    #[test]
    fn plan_is_optional_for_events_that_do_not_grant_access() {
        let mut doc = valid_document();
        doc["eventType"] = json!("payment.refunded");
        doc["data"].as_object_mut().unwrap().remove("planId");
        let n = PaymentNotification::parse(&doc).unwrap();
        assert!(n.data.plan_id.is_none());
    }

    #[test]
    fn largest_storable_amount_is_accepted() {
        let mut doc = valid_document();
        doc["data"]["amount"] = json!("9999999999.99");
        let n = PaymentNotification::parse(&doc).unwrap();
        assert_eq!(n.data.amount.to_string(), "9999999999.99");
    }

    #[test]
    fn unknown_event_type_still_parses() {
        let mut doc = valid_document();
        doc["eventType"] = json!("customer.updated");
        let n = PaymentNotification::parse(&doc).unwrap();
        assert_eq!(n.payment_status(), None);
    }

    // ══════════════════════════════════════════════════════════════
    // Rejections
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn non_object_body_is_malformed() {
        let err = PaymentNotification::parse(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, WebhookError::MalformedPayload(_)));
    }

    #[test]
    fn missing_event_type_is_rejected() {
        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("eventType");
        assert_eq!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::MissingField("eventType")
        );
    }

    #[test]
    fn missing_data_is_rejected() {
        let mut doc = valid_document();
        doc.as_object_mut().unwrap().remove("data");
        assert_eq!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::MissingField("data")
        );
    }

    #[test]
    fn data_must_be_an_object() {
        let mut doc = valid_document();
        doc["data"] = json!("pay_1");
        assert!(matches!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::InvalidField { field: "data", .. }
        ));
    }

    #[test]
    fn missing_payment_id_is_rejected() {
        let mut doc = valid_document();
        doc["data"].as_object_mut().unwrap().remove("paymentId");
        assert_eq!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::MissingField("paymentId")
        );
    }

    #[test]
    fn negative_amount_is_rejected() {
        let mut doc = valid_document();
        doc["data"]["amount"] = json!("-1.00");
        assert!(matches!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::InvalidField { field: "amount", .. }
        ));
    }

    #[test]
    fn sub_cent_amount_is_rejected() {
        let mut doc = valid_document();
        doc["data"]["amount"] = json!("1.005");
        assert!(matches!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::InvalidField { field: "amount", .. }
        ));
    }

    #[test]
    fn amount_beyond_ten_integer_digits_is_rejected() {
        let mut doc = valid_document();
        doc["data"]["amount"] = json!(10_000_000_000_u64);
        assert!(matches!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::InvalidField { field: "amount", .. }
        ));
    }

    #[test]
    fn succeeded_event_without_plan_is_rejected() {
        let mut doc = valid_document();
        doc["data"].as_object_mut().unwrap().remove("planId");
        assert_eq!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::MissingField("planId")
        );
    }

    #[test]
    fn bad_currency_is_rejected() {
        let mut doc = valid_document();
        doc["data"]["currency"] = json!("dollars");
        assert!(matches!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::InvalidField { field: "currency", .. }
        ));
    }

    #[test]
    fn customer_identity_is_required() {
        let mut doc = valid_document();
        doc["data"].as_object_mut().unwrap().remove("customerEmail");
        assert_eq!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::MissingField("customerEmail or customerId")
        );
    }

    #[test]
    fn unparseable_paid_at_is_rejected() {
        let mut doc = valid_document();
        doc["data"]["paidAt"] = json!("yesterday");
        assert!(matches!(
            PaymentNotification::parse(&doc).unwrap_err(),
            WebhookError::InvalidField { field: "paidAt", .. }
        ));
    }
}
