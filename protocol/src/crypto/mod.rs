//! Cryptographic primitives: hashing and recoverable ECDSA signatures.

pub mod hash;
pub mod keys;

pub use hash::{keccak256, sha256, sha256_hex};
pub use keys::{genesis_keypair, recover, verify, Keypair};
