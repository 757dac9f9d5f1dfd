//! # Hashing
//!
//! Two hash functions, each with one job:
//!
//! - **SHA-256** — content identity. Transaction hashes, block hashes and
//!   Merkle nodes are all SHA-256 over a canonical string form, so the
//!   hex digests are stable across implementations.
//! - **Keccak-256** — signing digests. Signatures recover against a
//!   Keccak digest of the signing preimage, matching the Ethereum-style
//!   key recovery the address format comes from.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// SHA-256 of the input, as a fixed 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of the input, hex-encoded. The form stored in block headers.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Keccak-256 of the input, as a fixed 32-byte array.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string, the canonical test vector.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_deterministic() {
        assert_eq!(sha256(b"ember"), sha256(b"ember"));
        assert_ne!(sha256(b"ember"), sha256(b"Ember"));
    }

    #[test]
    fn keccak256_known_vector() {
        // Keccak-256 (not NIST SHA3-256) of the empty string.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn keccak_differs_from_sha256() {
        assert_ne!(keccak256(b"ember"), sha256(b"ember"));
    }
}
