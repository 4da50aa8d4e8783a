//! Signature adapters.

mod hmac_verifier;

pub use hmac_verifier::HmacSha256Verifier;
