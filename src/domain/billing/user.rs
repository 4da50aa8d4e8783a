//! User entity, created lazily the first time a customer pays.

use crate::domain::foundation::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Normalizes an email address for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Paying customer.
///
/// Identified by email when the provider sends one, otherwise by the
/// provider's customer id. Users are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub external_customer_id: Option<String>,
    pub created_at: Timestamp,
}

impl User {
    pub fn with_email(email: &str) -> Self {
        Self {
            id: UserId::new(),
            email: Some(normalize_email(email)),
            external_customer_id: None,
            created_at: Timestamp::now(),
        }
    }

    pub fn with_external_customer_id(customer_id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: None,
            external_customer_id: Some(customer_id.into()),
            created_at: Timestamp::now(),
        }
    }
}
