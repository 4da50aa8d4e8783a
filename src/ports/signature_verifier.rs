//! SignatureVerifier port - authenticity check for inbound notifications.

/// Verifies that a request body was signed with the shared secret.
///
/// Implementations must compare in constant time and must never log the
/// secret or the expected signature.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true if `signature` matches `raw_body` under `secret`.
    ///
    /// `raw_body` must be the exact bytes received, not a re-serialization.
    fn verify(&self, raw_body: &[u8], signature: &str, secret: &str) -> bool;
}
