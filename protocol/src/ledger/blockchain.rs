//! # Ledger
//!
//! The ledger owns the block sequence, the mempool and the account model,
//! and is the only place where the three change together. It is internally
//! synchronized: tasks share one `Arc<Ledger>` and call methods, nothing
//! else mutates the parts.
//!
//! Admission deducts from the sender immediately; commitment credits the
//! receiver and clears the mempool entries. A node that adopts a foreign
//! chain replays it into a fresh account model instead.

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config;
use crate::crypto::keys;
use crate::error::{CoreError, Result};
use crate::ledger::accounts::{Account, AccountModel};
use crate::ledger::block::Block;
use crate::ledger::coin::Coin;
use crate::ledger::mempool::Mempool;
use crate::ledger::transaction::{Transaction, TxKind};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The serializable form of the whole ledger: just the blocks. Mempool and
/// account model are derived state and are rebuilt on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// The full chain, genesis first.
    pub blocks: Vec<Block>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The replicated ledger of one node.
#[derive(Debug, Default)]
pub struct Ledger {
    blocks: RwLock<Vec<Block>>,
    mempool: Mempool,
    accounts: AccountModel,
}

impl Ledger {
    /// Creates an uninitialized ledger. Call [`Ledger::init`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts `blocks` as the chain, or creates a genesis block under
    /// `validator` when none are given, then rebuilds the account model
    /// from scratch by replaying the adopted chain.
    pub fn init(&self, validator: &str, blocks: Vec<Block>) -> Result<()> {
        let adopted = if blocks.is_empty() {
            vec![Self::genesis_block(validator)?]
        } else {
            blocks
        };

        self.accounts.clear();
        self.accounts.from_blocks(&adopted);
        *self.blocks.write() = adopted;
        Ok(())
    }

    /// The genesis block: a single Exchange transaction minting the full
    /// supply from the embedded genesis key to itself. Deterministic, so
    /// every node that starts from nothing derives the same block.
    fn genesis_block(validator: &str) -> Result<Block> {
        let keypair = keys::genesis_keypair();
        let address = keypair.address();

        let preimage = Transaction::signing_preimage(&address, &address, config::MAX_SUPPLY);
        let signature = keypair.sign(preimage.as_bytes())?;

        let mint = Transaction {
            sender: address.clone(),
            receiver: address,
            signature,
            amount: config::MAX_SUPPLY,
            nonce: 0,
            timestamp: config::GENESIS_TIMESTAMP,
            kind: TxKind::Exchange,
        };

        Block::forge(validator, String::new(), vec![mint], config::GENESIS_TIMESTAMP)
    }

    // -- Chain access -------------------------------------------------------

    /// Number of committed blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// True until [`Ledger::init`] has run.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// The chain tip.
    pub fn last_block(&self) -> Result<Block> {
        self.blocks
            .read()
            .last()
            .cloned()
            .ok_or_else(|| CoreError::InvalidOperation("ledger is not initialized".into()))
    }

    /// Snapshot of one account.
    pub fn account(&self, address: &str) -> Result<Account> {
        self.accounts.get(address)
    }

    /// Number of transactions waiting in the mempool.
    pub fn pending(&self) -> usize {
        self.mempool.len()
    }

    // -- Block lifecycle ----------------------------------------------------

    /// Assembles a candidate block for `validator` from up to `max_tx`
    /// mempool transactions. The transactions stay in the mempool — they
    /// are removed on commit, not on candidacy.
    pub fn create_block(&self, validator: &str, max_tx: usize) -> Result<Block> {
        let transactions = self.mempool.retrieve(max_tx);
        let prev_hash = self.last_block()?.hash_hex();
        Block::forge(validator, prev_hash, transactions, config::unix_now())
    }

    /// Validates `block` against the tip as forged by `claimed_validator`,
    /// applies its transactions to the account model (a Stake debits its
    /// sender, everything else credits its receiver), removes them from
    /// the mempool, and appends the block.
    pub fn add_block(&self, block: Block, claimed_validator: &str) -> Result<()> {
        let mut blocks = self.blocks.write();
        let last = blocks
            .last()
            .ok_or_else(|| CoreError::InvalidOperation("ledger is not initialized".into()))?;

        block.validate(last, claimed_validator)?;

        for tx in &block.transactions {
            let applied = if tx.kind == TxKind::Stake {
                self.update_account_model(&tx.sender, -tx.amount)
            } else {
                self.update_account_model(&tx.receiver, tx.amount)
            };
            if let Err(e) = applied {
                warn!(tx = %tx.hash_hex(), error = %e, "could not apply committed transaction");
            }
        }

        // Best effort: a replica that never saw a transaction has no
        // mempool entry to remove.
        let _ = self.mempool.delete(&block.transactions);

        blocks.push(block);
        Ok(())
    }

    // -- Admission ----------------------------------------------------------

    /// Inserts a transaction into the mempool, rejecting duplicates.
    pub fn update_mempool(&self, transaction: Transaction) -> Result<()> {
        if self.mempool.exists(&transaction.canonical_string()) {
            return Err(CoreError::InvalidTransaction(
                "transaction already in mempool".into(),
            ));
        }
        self.mempool.add(std::slice::from_ref(&transaction))
    }

    /// Adjusts an account, creating it when unknown.
    pub fn update_account_model(&self, address: &str, delta: f64) -> Result<()> {
        if self.accounts.exists(address) {
            self.accounts.update(address, delta)
        } else {
            self.accounts.add(address, Coin::new(delta))
        }
    }

    /// Builds, verifies and admits a transaction on behalf of `sender`.
    ///
    /// Rejects an unknown sender, insufficient funds, a non-positive
    /// amount, a signature that does not recover to the sender, and a
    /// duplicate mempool key. On success the transaction is in the
    /// mempool and the sender's balance is already debited.
    pub fn create_transaction(
        &self,
        sender: &str,
        receiver: &str,
        signature: &str,
        amount: f64,
        kind: TxKind,
    ) -> Result<Transaction> {
        if amount <= 0.0 {
            return Err(CoreError::InvalidTransaction(
                "amount must be positive".into(),
            ));
        }

        let account = self
            .accounts
            .get(sender)
            .map_err(|_| CoreError::InvalidTransaction("unknown sender".into()))?;

        if account.balance < Coin::new(amount) {
            return Err(CoreError::InvalidTransaction("insufficient funds".into()));
        }

        let transaction = Transaction {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            signature: signature.to_string(),
            amount,
            nonce: account.nonce,
            timestamp: config::unix_now(),
            kind,
        };
        transaction.verify()?;

        self.update_mempool(transaction.clone())?;
        self.accounts.update(sender, -amount)?;

        Ok(transaction)
    }

    /// Admits a transaction received from a peer: checks the signature,
    /// the sender's existence and funds, and mempool distinctness, then
    /// admits and debits exactly like a locally created one.
    pub fn receive_transaction(&self, transaction: Transaction) -> Result<()> {
        transaction.verify()?;

        let account = self
            .accounts
            .get(&transaction.sender)
            .map_err(|_| CoreError::InvalidTransaction("unknown sender".into()))?;

        if account.balance < transaction.coin() {
            return Err(CoreError::InvalidTransaction("insufficient funds".into()));
        }

        self.update_mempool(transaction.clone())?;
        self.accounts.update(&transaction.sender, -transaction.amount)?;
        Ok(())
    }

    // -- Persistence --------------------------------------------------------

    /// A serializable copy of the chain.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            blocks: self.blocks.read().clone(),
        }
    }

    /// Installs a snapshot, replaying it into a fresh account model.
    pub fn restore(&self, snapshot: LedgerSnapshot, validator: &str) -> Result<()> {
        self.init(validator, snapshot.blocks)
    }

    /// Writes the snapshot as pretty JSON with owner-only permissions.
    pub fn dump(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.snapshot())?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(&data)?;
        Ok(())
    }

    /// Reads a snapshot written by [`Ledger::dump`].
    pub fn load(path: &Path) -> Result<LedgerSnapshot> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
