//! Key hashing
//!
//! Maps arbitrary string keys to fixed-length filesystem-safe identifiers.
//! The salt is fixed: collision resistance is the requirement here, not
//! secrecy.

use sha2::{Digest, Sha256};

const KEY_SALT: &[u8] = b"file-stream-cache";

/// Hash a cache key into its on-disk identifier (64 lowercase hex chars)
pub fn key_to_identifier(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_SALT);
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a directory entry name has the shape of a hashed identifier
pub(crate) fn is_identifier(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_deterministic() {
        assert_eq!(key_to_identifier("some key"), key_to_identifier("some key"));
    }

    #[test]
    fn test_distinct_keys_distinct_identifiers() {
        assert_ne!(key_to_identifier("key-a"), key_to_identifier("key-b"));
    }

    #[test]
    fn test_identifier_shape() {
        let id = key_to_identifier("anything at all, even / or ..");
        assert_eq!(id.len(), 64);
        assert!(is_identifier(&id));
    }

    #[test]
    fn test_is_identifier_rejects_other_names() {
        assert!(!is_identifier("notacache.txt"));
        assert!(!is_identifier("deadbeef"));
        // Right length but not hex
        assert!(!is_identifier(&"z".repeat(64)));
        // Uppercase hex is not what hex::encode produces
        assert!(!is_identifier(&"A".repeat(64)));
    }
}
