//! HMAC-SHA256 webhook signature verification.
//!
//! The provider signs the exact request body with the shared secret and
//! sends the hex digest in a header, optionally prefixed with `sha256=`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::ports::SignatureVerifier;

const DIGEST_PREFIX: &str = "sha256=";

/// Verifies hex-encoded HMAC-SHA256 signatures over the raw body.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Verifier;

impl HmacSha256Verifier {
    pub fn new() -> Self {
        Self
    }

    /// Computes the hex signature the provider would send for `raw_body`.
    pub fn sign(secret: &str, raw_body: &[u8]) -> String {
        hex::encode(compute_signature(secret, raw_body))
    }
}

impl SignatureVerifier for HmacSha256Verifier {
    fn verify(&self, raw_body: &[u8], signature: &str, secret: &str) -> bool {
        let signature = signature.trim();
        let signature = signature.strip_prefix(DIGEST_PREFIX).unwrap_or(signature);
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        constant_time_compare(&compute_signature(secret, raw_body), &provided)
    }
}

fn compute_signature(secret: &str, raw_body: &[u8]) -> Vec<u8> {
    // Hmac accepts any key length.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return Vec::new();
    };
    mac.update(raw_body);
    mac.finalize().into_bytes().to_vec()
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
