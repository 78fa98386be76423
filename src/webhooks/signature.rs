//! HMAC-SHA256 webhook signature verification (§4.7). Every processor
//! signs `timestamp || "\n" || raw_body` with its shared secret; the
//! ingestor recomputes the MAC and compares it in constant time before
//! trusting a single byte of the delivery.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedSignature,
    #[error("timestamp outside tolerance window")]
    StaleTimestamp,
    #[error("signature does not match")]
    Mismatch,
}

/// Verifies `signature_hex` against `secret`, `timestamp`, and
/// `raw_body`, rejecting any timestamp further than `tolerance_seconds`
/// from now in either direction.
pub fn verify(
    secret: &[u8],
    timestamp: i64,
    raw_body: &[u8],
    signature_hex: &str,
    tolerance_seconds: i64,
) -> Result<(), SignatureError> {
    let now = Utc::now().timestamp();
    if (now - timestamp).abs() > tolerance_seconds {
        return Err(SignatureError::StaleTimestamp);
    }

    let provided = hex::decode(signature_hex).map_err(|_| SignatureError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b"\n");
    mac.update(raw_body);
    mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_correctly_signed_recent_payload() {
        let secret = b"shh";
        let now = Utc::now().timestamp();
        let body = b"{\"kind\":\"capture_ok\"}";
        let sig = sign(secret, now, body);
        assert!(verify(secret, now, body, &sig, 300).is_ok());
    }

    #[test]
    fn rejects_a_tampered_body() {
        let secret = b"shh";
        let now = Utc::now().timestamp();
        let sig = sign(secret, now, b"original");
        assert_eq!(verify(secret, now, b"tampered", &sig, 300), Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_a_signature_from_a_different_secret() {
        let now = Utc::now().timestamp();
        let body = b"payload";
        let sig = sign(b"wrong-secret", now, body);
        assert_eq!(verify(b"shh", now, body, &sig, 300), Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let secret = b"shh";
        let old = Utc::now().timestamp() - 3600;
        let body = b"payload";
        let sig = sign(secret, old, body);
        assert_eq!(verify(secret, old, body, &sig, 300), Err(SignatureError::StaleTimestamp));
    }

    #[test]
    fn rejects_a_malformed_signature_header() {
        let now = Utc::now().timestamp();
        assert_eq!(
            verify(b"shh", now, b"payload", "not-hex!!", 300),
            Err(SignatureError::MalformedSignature)
        );
    }
}
