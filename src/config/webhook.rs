//! Webhook intake configuration

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use crate::adapters::plans::{ConfiguredPlanCatalog, DEFAULT_PLAN_DURATIONS};

const MIN_SECRET_LEN: usize = 16;
const MAX_REPLAY_GRACE_SECS: u64 = 7 * 24 * 60 * 60;

/// Webhook intake configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret the provider signs request bodies with
    pub signing_secret: SecretString,

    /// Request header carrying the signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Plan durations as `plan=days,plan=days`
    #[serde(default = "default_plan_durations")]
    pub plan_durations: String,

    /// Minimum age before a `received` event may be replayed
    #[serde(default = "default_replay_grace")]
    pub replay_grace_secs: u64,
}

impl WebhookConfig {
    pub fn plan_catalog(&self) -> Result<ConfiguredPlanCatalog, ValidationError> {
        ConfiguredPlanCatalog::parse(&self.plan_durations)
            .map_err(|e| ValidationError::InvalidPlanDurations(e.to_string()))
    }

    pub fn replay_grace(&self) -> Duration {
        Duration::seconds(self.replay_grace_secs.min(MAX_REPLAY_GRACE_SECS) as i64)
    }

    /// Validate webhook configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.signing_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("WEBHOOK__SIGNING_SECRET"));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(ValidationError::SigningSecretTooShort(MIN_SECRET_LEN));
        }
        if axum::http::HeaderName::from_bytes(self.signature_header.as_bytes()).is_err() {
            return Err(ValidationError::InvalidSignatureHeader(
                self.signature_header.clone(),
            ));
        }
        self.plan_catalog()?;
        Ok(())
    }
}

fn default_signature_header() -> String {
    "X-Signature".to_string()
}

fn default_plan_durations() -> String {
    DEFAULT_PLAN_DURATIONS.to_string()
}

fn default_replay_grace() -> u64 {
    300
}
