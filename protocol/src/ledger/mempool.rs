//! # Mempool
//!
//! Thread-safe pool of unconfirmed transactions, keyed by canonical
//! string. Batch operations are best-effort: a duplicate or missing key
//! fails that entry without aborting the rest, and the first error is
//! reported to the caller.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::ledger::transaction::Transaction;

/// The pool of transactions awaiting block inclusion.
#[derive(Debug, Default)]
pub struct Mempool {
    pool: RwLock<HashMap<String, Transaction>>,
}

impl Mempool {
    /// Creates an empty mempool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts each transaction, keyed by its canonical string. A
    /// duplicate key yields `InvalidOperation` for that entry; the rest
    /// of the batch still goes in. Returns the first error, if any.
    pub fn add(&self, transactions: &[Transaction]) -> Result<()> {
        let mut first_error = None;

        for tx in transactions {
            let key = tx.canonical_string();
            let mut pool = self.pool.write();

            if pool.contains_key(&key) {
                if first_error.is_none() {
                    first_error = Some(CoreError::InvalidOperation(format!(
                        "key {key} already exists"
                    )));
                }
                continue;
            }

            pool.insert(key, tx.clone());
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Membership test on a canonical-string key.
    pub fn exists(&self, key: &str) -> bool {
        self.pool.read().contains_key(key)
    }

    /// Returns up to `amount` transactions — all of them when `amount` is
    /// zero. No ordering is guaranteed.
    pub fn retrieve(&self, amount: usize) -> Vec<Transaction> {
        let pool = self.pool.read();
        let amount = if amount == 0 { pool.len() } else { amount };
        pool.values().take(amount).cloned().collect()
    }

    /// Removes each transaction. A missing key yields `InvalidOperation`
    /// for that entry without aborting the batch; the first error is
    /// returned.
    pub fn delete(&self, transactions: &[Transaction]) -> Result<()> {
        let mut first_error = None;

        for tx in transactions {
            let key = tx.canonical_string();
            let mut pool = self.pool.write();

            if pool.remove(&key).is_none() && first_error.is_none() {
                first_error = Some(CoreError::InvalidOperation(format!(
                    "key {key} does not exist"
                )));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Empties the pool.
    pub fn clear(&self) {
        self.pool.write().clear();
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.pool.read().len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pool.read().is_empty()
    }
}
