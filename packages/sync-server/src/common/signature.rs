//! Webhook signature verification.
//!
//! Signatures are HMAC-SHA256 over the exact byte stream of the request
//! body, encoded as lowercase hex. Verification must happen before any JSON
//! parsing: re-serializing the payload would normalize whitespace and break
//! the digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::errors::SyncError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded digest.
pub const SIGNATURE_HEADER: &str = "x-marketplace-signature";

/// Compute the lowercase-hex HMAC-SHA256 digest of a body.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature header against the raw body.
///
/// The digest comparison is constant-time (`Mac::verify_slice`): the result
/// depends only on equality, never on the position of the first differing
/// byte.
pub fn verify(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), SyncError> {
    let signature = signature.ok_or(SyncError::BadSignature)?;
    let digest = hex::decode(signature.trim()).map_err(|_| SyncError::BadSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&digest).map_err(|_| SyncError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "secret";
    const BODY: &[u8] = br#"{"product_code":"PROD-ABC-123","available_stock":50}"#;

    #[test]
    fn valid_signature_verifies() {
        let sig = sign(SECRET, BODY);
        assert!(verify(SECRET, BODY, Some(&sig)).is_ok());
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = sign(SECRET, BODY);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn missing_signature_is_rejected() {
        assert!(matches!(
            verify(SECRET, BODY, None),
            Err(SyncError::BadSignature)
        ));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let mut sig = sign(SECRET, BODY);
        // Flip the last nibble.
        let last = sig.pop().unwrap();
        sig.push(if last == '0' { '1' } else { '0' });
        assert!(verify(SECRET, BODY, Some(&sig)).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let sig = sign("other-secret", BODY);
        assert!(verify(SECRET, BODY, Some(&sig)).is_err());
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        assert!(verify(SECRET, BODY, Some("not hex at all")).is_err());
    }

    #[test]
    fn signature_covers_exact_bytes() {
        // Whitespace-only difference in the body must invalidate the digest.
        let sig = sign(SECRET, BODY);
        let reformatted = br#"{ "product_code": "PROD-ABC-123", "available_stock": 50 }"#;
        assert!(verify(SECRET, reformatted, Some(&sig)).is_err());
    }
}
