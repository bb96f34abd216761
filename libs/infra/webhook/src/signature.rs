// [libs/infra/webhook/src/signature.rs]
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `body` under `secret`, hex-encoded for the
/// `X-PayGate-Signature` header.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_is_deterministic() {
        assert_eq!(sign("secret", b"payload"), sign("secret", b"payload"));
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        assert_ne!(sign("secret-a", b"payload"), sign("secret-b", b"payload"));
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = sign("secret", b"payload");
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
