// Hashing utilities

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256 hash.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, used for address checksums.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// RIPEMD160(SHA256(data)) - the public key hash behind every address.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_is_deterministic() {
        let data = b"hello world";
        assert_eq!(sha256(data), sha256(data));
        assert_ne!(sha256(data), sha256(b"hello worle"));
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256d_differs_from_single() {
        let data = b"payload";
        assert_eq!(sha256d(data), sha256(&sha256(data)));
        assert_ne!(sha256d(data), sha256(data));
    }

    #[test]
    fn test_hash160_length() {
        assert_eq!(hash160(b"some public key").len(), 20);
    }
}
