//! # Transactions
//!
//! A transaction is immutable after creation. Its **canonical string** is
//! the stable, injective text form that keys the mempool and feeds the
//! SHA-256 transaction hash; it must never change shape once a network
//! exists, because every replica derives the same keys from it.
//!
//! Signatures do not cover the canonical string. The signing digest is
//! Keccak-256 over `sender || receiver || amount` with the amount rendered
//! to six fractional digits, so a wallet can sign before the node assigns
//! the nonce and timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::hash::sha256;
use crate::crypto::keys;
use crate::error::{CoreError, Result};
use crate::ledger::coin::Coin;

// ---------------------------------------------------------------------------
// TxKind
// ---------------------------------------------------------------------------

/// Discriminant for the operation a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Value transfer between two addresses.
    Regular,
    /// Locks the amount as election stake. Carries no receiver.
    Stake,
    /// Protocol reward credited to a validator.
    Reward,
    /// Fee charge.
    Fee,
    /// Penalty debit.
    Penalty,
    /// Supply issuance. The genesis block mints with this kind.
    Exchange,
}

impl TxKind {
    /// The lowercase wire name, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Stake => "stake",
            Self::Reward => "reward",
            Self::Fee => "fee",
            Self::Penalty => "penalty",
            Self::Exchange => "exchange",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A signed value movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex-encoded SEC1-uncompressed public key of the sender.
    pub sender: String,
    /// Receiver address, or empty for Stake transactions.
    pub receiver: String,
    /// Hex-encoded recoverable ECDSA signature over the signing digest.
    pub signature: String,
    /// Amount moved. Coin-valued on the wire; arithmetic goes through
    /// [`Coin`].
    pub amount: f64,
    /// The sender account's transaction count at creation time.
    pub nonce: u64,
    /// Unix seconds at creation time.
    pub timestamp: i64,
    /// What the transaction does.
    pub kind: TxKind,
}

impl Transaction {
    /// The stable, injective text form. Every field, fixed order. This
    /// string keys the mempool and feeds [`Transaction::hash`]; treat its
    /// shape as part of the wire format.
    pub fn canonical_string(&self) -> String {
        format!(
            "{{{} {} {} {} {} {} {}}}",
            self.sender,
            self.receiver,
            self.signature,
            Coin::new(self.amount),
            self.nonce,
            self.timestamp,
            self.kind,
        )
    }

    /// SHA-256 over the canonical string.
    pub fn hash(&self) -> [u8; 32] {
        sha256(self.canonical_string().as_bytes())
    }

    /// The hash, hex-encoded.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    /// The preimage a wallet signs: `sender || receiver || amount`, with
    /// the amount rendered to six fractional digits.
    pub fn signing_preimage(sender: &str, receiver: &str, amount: f64) -> String {
        format!("{sender}{receiver}{amount:.6}")
    }

    /// Verifies the signature: recovers the public key from the signature
    /// over the signing digest and requires byte equality with `sender`.
    pub fn verify(&self) -> Result<()> {
        if self.sender.is_empty() {
            return Err(CoreError::InvalidTransaction("missing sender".into()));
        }

        let preimage = Self::signing_preimage(&self.sender, &self.receiver, self.amount);
        let recovered = keys::recover(preimage.as_bytes(), &self.signature)
            .map_err(|e| CoreError::InvalidTransaction(format!("signature rejected: {e}")))?;

        if recovered != self.sender {
            return Err(CoreError::InvalidTransaction(
                "signature does not recover to sender".into(),
            ));
        }

        Ok(())
    }

    /// The amount as a [`Coin`].
    pub fn coin(&self) -> Coin {
        Coin::new(self.amount)
    }
}
