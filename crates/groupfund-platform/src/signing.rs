use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, payload: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    mac
}

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    hex::encode(mac(secret, payload).finalize().into_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac(secret, payload).verify_slice(&expected).is_ok()
}

/// Compares two shared secrets without an early exit on the first mismatch.
pub fn secrets_match(expected: &str, candidate: &str) -> bool {
    verify(expected, b"groupfund", &sign(candidate, b"groupfund"))
}
