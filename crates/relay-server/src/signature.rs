use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA-256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "linear-signature";

/// Check `signature` against the HMAC-SHA-256 of `body` under `secret`.
///
/// Runs over the exact bytes received, before any parsing. The digest
/// comparison is constant-time. A missing or empty signature, or an empty
/// secret, never verifies.
pub fn verify(body: &[u8], signature: Option<&str>, secret: &str) -> bool {
    let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Some(expected) = decode_hex(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA-256 of `body`, in the format [`verify`] accepts.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(body);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| {
            value
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"type":"AgentSessionEvent","action":"created"}"#;

    #[test]
    fn correct_signature_verifies() {
        let sig = sign(BODY, "secret-a");
        assert_eq!(sig.len(), 64);
        assert!(verify(BODY, Some(&sig), "secret-a"));
        assert!(verify(BODY, Some(&format!("sha256={sig}")), "secret-a"));
        assert!(verify(BODY, Some(&sig.to_uppercase()), "secret-a"));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign(BODY, "secret-a");
        assert!(!verify(BODY, Some(&sig), "secret-b"));
    }

    #[test]
    fn any_flipped_byte_fails() {
        let sig = sign(BODY, "secret-a");
        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(!verify(&tampered, Some(&sig), "secret-a"), "byte {i}");
        }
    }

    #[test]
    fn missing_or_malformed_signatures_fail() {
        assert!(!verify(BODY, None, "secret-a"));
        assert!(!verify(BODY, Some(""), "secret-a"));
        assert!(!verify(BODY, Some("   "), "secret-a"));
        assert!(!verify(BODY, Some("abc"), "secret-a"));
        assert!(!verify(BODY, Some("zz"), "secret-a"));
        assert!(!verify(BODY, Some(&sign(BODY, "")), ""));
    }
}
