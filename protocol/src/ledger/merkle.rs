//! # Merkle Commitment
//!
//! A deterministic binary Merkle tree over an ordered list of leaf byte
//! strings. Leaves are hashed on entry (`SHA-256(leaf)`), levels are built
//! bottom-up, and an odd level duplicates its last node before pairing.
//! Only the root survives — there are no parent pointers and no proofs,
//! because the block header only carries the commitment.

use crate::crypto::hash::sha256;
use crate::error::{CoreError, Result};

/// A built Merkle tree. Construction either yields a root or fails on
/// empty input; the root never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    root: [u8; 32],
}

impl MerkleTree {
    /// Builds the tree over `leaves`, in order.
    ///
    /// Each leaf becomes `SHA-256(leaf)`; parents are
    /// `SHA-256(left || right)`; a level with an odd node count duplicates
    /// its last node. Empty input is an error — a commitment over nothing
    /// is meaningless.
    pub fn build(leaves: &[Vec<u8>]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(CoreError::InvalidData(
                "no nodes could be created from empty input".into(),
            ));
        }

        let mut level: Vec<[u8; 32]> = leaves.iter().map(|leaf| sha256(leaf)).collect();

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                let last = level[level.len() - 1];
                level.push(last);
            }

            let mut parents = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                let mut joined = [0u8; 64];
                joined[..32].copy_from_slice(&pair[0]);
                joined[32..].copy_from_slice(&pair[1]);
                parents.push(sha256(&joined));
            }

            level = parents;
        }

        Ok(Self { root: level[0] })
    }

    /// The root commitment.
    pub fn root(&self) -> &[u8; 32] {
        &self.root
    }

    /// The root commitment, hex-encoded. The form stored in block headers.
    pub fn root_hex(&self) -> String {
        hex::encode(self.root)
    }
}
