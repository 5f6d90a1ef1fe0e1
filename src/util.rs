//! Small helpers shared across subsystems: server-style timestamps and
//! content hashing.
//!
//! The persistent store in production is an external document database
//! that stamps `createdAt`/`updatedAt` fields with its own clock
//! ("server timestamps"). `SqliteStore` stands in for that database
//! locally, so every write goes through [`now_ts`] rather than letting
//! callers supply their own clock reading.

use sha2::{Digest, Sha256};

/// Unix timestamp in seconds, matching the precision the store records
/// use for `createdAt`/`updatedAt`/`lockExpiresAt`.
#[must_use]
pub fn now_ts() -> i64 {
    std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or(0)
}

/// Deterministic, collision-resistant content hash.
///
/// A cyrb53-style 53-bit mix or SHA-256 both satisfy the determinism/
/// collision-resistance contract chunk and request keys need; SHA-256
/// is used here since it is already a dependency and gives a stronger
/// guarantee with no practical downside at this scale.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of an already-assembled key string, used for the
/// request fingerprint and the legacy explanation cache key.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
    }

    #[test]
    fn content_hash_changes_with_one_character() {
        assert_ne!(content_hash("hello"), content_hash("hellp"));
    }

    #[test]
    fn sha256_hex_matches_known_digest() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }
}
