//! Remote Request Signing — HMAC-SHA256
//!
//! Signs every action request sent to the remote data service.
//! Credentials come from environment variables (LEADX_API_KEY,
//! LEADX_API_SECRET). Without them requests go out unsigned, which
//! is what a freshly deployed backend without auth expects.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;

/// Header carrying the API key.
pub const HEADER_KEY: &str = "X-Leadx-Key";
/// Header carrying the signing timestamp (Unix seconds).
pub const HEADER_TIMESTAMP: &str = "X-Leadx-Timestamp";
/// Header carrying the base64 HMAC signature.
pub const HEADER_SIGNATURE: &str = "X-Leadx-Signature";

/// Request signer for the remote data service.
pub struct RequestSigner {
    /// API key from LEADX_API_KEY.
    api_key: String,
    /// API secret from LEADX_API_SECRET (never sent in headers).
    api_secret: String,
}

impl RequestSigner {
    /// Create a signer from explicit credentials.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Load credentials from the environment, if both are set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("LEADX_API_KEY").ok()?;
        let api_secret = std::env::var("LEADX_API_SECRET").ok()?;
        if api_key.is_empty() || api_secret.is_empty() {
            return None;
        }
        Some(Self::new(api_key, api_secret))
    }

    /// Get the API key for request headers.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Current Unix timestamp in seconds.
    pub fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string()
    }

    /// Sign a request.
    ///
    /// Signature format: base64(HMAC-SHA256(secret, timestamp + action + body))
    pub fn sign(&self, timestamp: &str, action: &str, body: &str) -> String {
        let message = format!("{timestamp}{action}{body}");
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), self.api_secret.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac)
    }

    /// Build (key, timestamp, signature) headers for a request.
    pub fn headers(&self, action: &str, body: &str) -> [(&'static str, String); 3] {
        let timestamp = Self::timestamp();
        let signature = self.sign(&timestamp, action, body);
        [
            (HEADER_KEY, self.api_key.clone()),
            (HEADER_TIMESTAMP, timestamp),
            (HEADER_SIGNATURE, signature),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic_and_secret_bound() {
        let a = RequestSigner::new("key", "secret-a");
        let b = RequestSigner::new("key", "secret-b");

        let sig1 = a.sign("1700000000", "commit-bid", "{}");
        let sig2 = a.sign("1700000000", "commit-bid", "{}");
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, b.sign("1700000000", "commit-bid", "{}"));
        assert_ne!(sig1, a.sign("1700000000", "adjust-balance", "{}"));
    }

    #[test]
    fn test_headers_never_carry_secret() {
        let signer = RequestSigner::new("key", "top-secret");
        for (_, value) in signer.headers("snapshot", "") {
            assert!(!value.contains("top-secret"));
        }
    }
}
