//! Body digests for cache listings

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a response body
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_differs_per_body() {
        assert_ne!(sha256(b"v1 body"), sha256(b"v2 body"));
        assert_eq!(sha256(b"same").len(), 64);
    }
}
