//! SHA-256 digest helper (component J), used to bind adapter/plugin
//! signatures and audit log entries. Uses `sha2` rather than a hand-rolled
//! compression function, since the dependency is already part of the
//! crate's stack.

use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Case-insensitive hex digest comparison, so an upper- or lower-case
/// hash in a config file still matches a canonical lower-case digest.
pub fn hash_equals(expected_hex: &str, actual_hex: &str) -> bool {
    expected_hex.len() == actual_hex.len()
        && expected_hex
            .chars()
            .zip(actual_hex.chars())
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        assert_eq!(sha256_hex(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
    }

    #[test]
    fn hash_equals_is_case_insensitive() {
        assert!(hash_equals("AbCd", "abcd"));
        assert!(!hash_equals("abcd", "abce"));
        assert!(!hash_equals("abc", "abcd"));
    }
}
