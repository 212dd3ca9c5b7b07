//! Content digest used as the cache key for analysis results.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of an image reference's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash the raw bytes of an image reference.
///
/// The reference is hashed as given (a URL or an inline data payload); nothing
/// is fetched or decoded.
pub fn content_digest(image_ref: &str) -> ContentDigest {
    let digest = Sha256::digest(image_ref.as_bytes());
    ContentDigest(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = content_digest("data:image/jpeg;base64,/9j/4AAQ");
        let b = content_digest("data:image/jpeg;base64,/9j/4AAQ");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_matches_known_sha256() {
        assert_eq!(
            content_digest("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn different_refs_differ() {
        assert_ne!(content_digest("https://a/1.jpg"), content_digest("https://a/2.jpg"));
    }
}
