//! HMAC request-signing helpers shared by the Binance and OKX clients.
//!
//! Both venues sign a request payload with an HMAC over the account secret;
//! they differ only in what gets signed and how the digest is encoded
//! (Binance: hex, OKX: base64). Neither the secret nor the computed
//! signature is ever logged — callers must not pass either through
//! `tracing` fields.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("secret key has invalid length for HMAC")]
    InvalidKeyLength,
}

/// Binance-style signature: HMAC-SHA256 over the query string, hex encoded.
pub fn sign_hex(secret: &str, payload: &str) -> Result<String, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError::InvalidKeyLength)?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// OKX-style signature: HMAC-SHA256 over `timestamp + method + path + body`,
/// base64 encoded.
pub fn sign_base64(secret: &str, payload: &str) -> Result<String, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SigningError::InvalidKeyLength)?;
    mac.update(payload.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Wraps an API secret so its `Debug` implementation never leaks the value,
/// even via `{:?}` in a log line or panic message.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_signature_is_deterministic() {
        let a = sign_hex("secret", "payload").unwrap();
        let b = sign_hex("secret", "payload").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, sign_hex("secret", "other-payload").unwrap());
    }

    #[test]
    fn base64_signature_is_deterministic() {
        let a = sign_base64("secret", "payload").unwrap();
        let b = sign_base64("secret", "payload").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn secret_debug_never_exposes_value() {
        let secret = Secret::new("super-secret-value");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
    }
}
