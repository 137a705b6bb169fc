//! HMAC-SHA256 request signing for outbound webhook deliveries.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded `HMAC-SHA256(secret, body)`, sent as
/// `X-LinkForty-Signature: sha256={hex}`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_secret_and_body_produce_same_signature() {
        let a = sign_body("s3cr3t", b"{\"a\":1}");
        let b = sign_body("s3cr3t", b"{\"a\":1}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // 32 bytes hex-encoded
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let a = sign_body("s3cr3t-a", b"body");
        let b = sign_body("s3cr3t-b", b"body");
        assert_ne!(a, b);
    }
}
