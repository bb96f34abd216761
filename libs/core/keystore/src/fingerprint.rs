// [libs/core/keystore/src/fingerprint.rs]
use rand::RngCore;

/// Generates `<prefix>_<48 hex chars>` from a CSPRNG (spec §4.1 `createKey`).
pub fn generate_fingerprint(prefix: &str) -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(48);
    for b in bytes {
        hex.push_str(&format!("{b:02x}"));
    }
    format!("{prefix}_{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_has_expected_shape() {
        let fp = generate_fingerprint("pg");
        assert!(fp.starts_with("pg_"));
        assert_eq!(fp.len(), "pg_".len() + 48);
        assert!(fp[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprints_are_unique() {
        let a = generate_fingerprint("pg");
        let b = generate_fingerprint("pg");
        assert_ne!(a, b);
    }
}
