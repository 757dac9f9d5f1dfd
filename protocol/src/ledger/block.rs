//! # Blocks
//!
//! A block is a header plus an ordered transaction list. The block hash is
//! SHA-256 over a canonical string covering every field, so replicas agree
//! on identity byte-for-byte.
//!
//! One inherited quirk, kept deliberately: **`height` is the number of
//! transactions in the block, not the chain position.** Validation
//! enforces it, snapshots carry it, and changing it would re-hash every
//! existing chain. Chain position is the block's index in the ledger.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::sha256;
use crate::error::{CoreError, Result};
use crate::ledger::merkle::MerkleTree;
use crate::ledger::transaction::Transaction;

/// A forged block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Peer identifier of the validator that forged this block.
    pub validator: String,
    /// Hex Merkle root over the transaction hashes.
    pub merkle_root: String,
    /// Hex hash of the predecessor, empty for genesis.
    pub prev_hash: String,
    /// Number of transactions in this block (see the module note).
    pub height: u64,
    /// Unix seconds at forge time.
    pub timestamp: i64,
    /// Ordered transactions.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assembles a block: computes the Merkle commitment over the
    /// transaction hashes and sets `height` to the transaction count.
    /// Fails on an empty transaction list (the Merkle tree rejects it).
    pub fn forge(
        validator: &str,
        prev_hash: String,
        transactions: Vec<Transaction>,
        timestamp: i64,
    ) -> Result<Self> {
        let merkle_root = Self::merkle_root_of(&transactions)?;

        Ok(Self {
            validator: validator.to_string(),
            merkle_root,
            prev_hash,
            height: transactions.len() as u64,
            timestamp,
            transactions,
        })
    }

    /// The Merkle commitment over a transaction list: each leaf is the
    /// transaction's SHA-256 hash.
    pub fn merkle_root_of(transactions: &[Transaction]) -> Result<String> {
        let leaves: Vec<Vec<u8>> = transactions.iter().map(|tx| tx.hash().to_vec()).collect();
        Ok(MerkleTree::build(&leaves)?.root_hex())
    }

    /// The stable text form feeding the block hash. Every field, fixed
    /// order, transactions by canonical string.
    pub fn canonical_string(&self) -> String {
        let transactions: Vec<String> = self
            .transactions
            .iter()
            .map(Transaction::canonical_string)
            .collect();
        format!(
            "{{{} {} {} {} {} [{}]}}",
            self.validator,
            self.merkle_root,
            self.prev_hash,
            self.height,
            self.timestamp,
            transactions.join(" "),
        )
    }

    /// SHA-256 over the canonical string.
    pub fn hash(&self) -> [u8; 32] {
        sha256(self.canonical_string().as_bytes())
    }

    /// The hash, hex-encoded — the form carried in `prev_hash` links.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// Validates this block as the successor of `prev`, forged by
    /// `expected_validator`. All five checks must hold:
    ///
    /// 1. `prev_hash` links to `prev`,
    /// 2. time does not run backwards,
    /// 3. the validator is the elected one,
    /// 4. the Merkle root matches the transactions,
    /// 5. `height` equals the transaction count.
    pub fn validate(&self, prev: &Block, expected_validator: &str) -> Result<()> {
        if self.prev_hash != prev.hash_hex() {
            return Err(CoreError::InvalidBlock(
                "previous hash does not match".into(),
            ));
        }

        if self.timestamp < prev.timestamp {
            return Err(CoreError::InvalidBlock(
                "timestamp precedes previous block".into(),
            ));
        }

        if self.validator != expected_validator {
            return Err(CoreError::InvalidBlock("invalid validator".into()));
        }

        if Self::merkle_root_of(&self.transactions)? != self.merkle_root {
            return Err(CoreError::InvalidBlock("merkle root does not match".into()));
        }

        if self.height != self.transactions.len() as u64 {
            return Err(CoreError::InvalidBlock("height does not match".into()));
        }

        Ok(())
    }
}
