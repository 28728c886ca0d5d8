//! SHA-256 digests for transfer integrity.

use sha2::{Digest, Sha256};

/// Hash a byte buffer.
#[must_use]
pub fn digest_bytes(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Check a buffer against an expected digest.
#[must_use]
pub fn verify_digest(data: &[u8], expected: &[u8; 32]) -> bool {
    digest_bytes(data) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_matches_known_vector() {
        // SHA-256 of the empty string.
        let expected = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(digest_bytes(b""), expected);
        assert!(verify_digest(b"", &expected));
    }

    #[test]
    fn test_verify_rejects_wrong_digest() {
        assert!(!verify_digest(b"payload", &[0u8; 32]));
    }
}
