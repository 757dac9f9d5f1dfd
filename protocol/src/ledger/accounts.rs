//! # Account Model
//!
//! Derived state: address → balance and nonce, rebuilt from the chain at
//! bootstrap and kept current as transactions are admitted and blocks
//! committed. The nonce counts applied balance changes for the address
//! and is what new transactions stamp as their sequence number.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::ledger::block::Block;
use crate::ledger::coin::Coin;
use crate::ledger::transaction::TxKind;

/// One account's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Account {
    /// Current balance. Never negative through the public operations.
    pub balance: Coin,
    /// Number of applied updates for this address.
    pub nonce: u64,
}

/// Thread-safe address → [`Account`] mapping.
#[derive(Debug, Default)]
pub struct AccountModel {
    accounts: RwLock<HashMap<String, Account>>,
}

impl AccountModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Membership test. The empty address is never a member.
    pub fn exists(&self, address: &str) -> bool {
        !address.is_empty() && self.accounts.read().contains_key(address)
    }

    /// Snapshot of one account.
    pub fn get(&self, address: &str) -> Result<Account> {
        self.accounts
            .read()
            .get(address)
            .copied()
            .ok_or_else(|| CoreError::InvalidOperation("account does not exist".into()))
    }

    /// Creates an account with the given balance and a zero nonce.
    pub fn add(&self, address: &str, balance: Coin) -> Result<()> {
        if address.is_empty() {
            return Err(CoreError::InvalidArgument("empty address".into()));
        }
        if balance.is_negative() {
            return Err(CoreError::InvalidInput("balance cannot be negative".into()));
        }

        let mut accounts = self.accounts.write();
        if accounts.contains_key(address) {
            return Err(CoreError::InvalidOperation("account already exists".into()));
        }

        accounts.insert(address.to_string(), Account { balance, nonce: 0 });
        Ok(())
    }

    /// Adjusts an account's balance by `delta` and increments its nonce.
    /// Fails when the account is missing or the result would be negative.
    pub fn update(&self, address: &str, delta: f64) -> Result<()> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(address)
            .ok_or_else(|| CoreError::InvalidOperation("account does not exist".into()))?;

        let balance = account.balance.add(delta);
        if balance.is_negative() {
            return Err(CoreError::InvalidOperation(
                "balance cannot be negative".into(),
            ));
        }

        account.balance = balance;
        account.nonce += 1;
        Ok(())
    }

    /// Rebuilds balances by replaying every transaction of every block, in
    /// order. Senders unknown at replay time are created with a zero
    /// balance and a nonce of one; unknown receivers start with the
    /// credited amount. Stake transactions carry no receiver and only
    /// debit the sender.
    ///
    /// Existing accounts are kept and replayed into — the ledger decides
    /// when a rebuild starts from a clean slate.
    pub fn from_blocks(&self, blocks: &[Block]) {
        let mut accounts = self.accounts.write();

        for block in blocks {
            for tx in &block.transactions {
                accounts
                    .entry(tx.sender.clone())
                    .and_modify(|account| {
                        account.balance = account.balance.sub(tx.amount);
                        account.nonce += 1;
                    })
                    .or_insert(Account {
                        balance: Coin::zero(),
                        nonce: 1,
                    });

                if tx.kind == TxKind::Stake || tx.receiver.is_empty() {
                    continue;
                }

                accounts
                    .entry(tx.receiver.clone())
                    .and_modify(|account| {
                        account.balance = account.balance.add(tx.amount);
                    })
                    .or_insert(Account {
                        balance: Coin::new(tx.amount),
                        nonce: 0,
                    });
            }
        }
    }

    /// Drops every account. Used by the ledger when it rebuilds from an
    /// adopted chain.
    pub fn clear(&self) {
        self.accounts.write().clear();
    }

    /// Number of known accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// True when no account exists.
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::transaction::Transaction;

    fn transfer(sender: &str, receiver: &str, amount: f64) -> Transaction {
        Transaction {
            sender: sender.into(),
            receiver: receiver.into(),
            signature: "sig".into(),
            amount,
            nonce: 0,
            timestamp: 100,
            kind: TxKind::Regular,
        }
    }

    fn block_of(transactions: Vec<Transaction>) -> Block {
        // Replay only reads the transaction list; links are irrelevant here.
        Block {
            validator: "v".into(),
            merkle_root: String::new(),
            prev_hash: String::new(),
            height: transactions.len() as u64,
            timestamp: 100,
            transactions,
        }
    }

    #[test]
    fn add_get_roundtrip() {
        let model = AccountModel::new();
        model.add("alice", Coin::new(50.0)).unwrap();

        let account = model.get("alice").unwrap();
        assert_eq!(account.balance, Coin::new(50.0));
        assert_eq!(account.nonce, 0);
    }

    #[test]
    fn add_rejects_duplicates_and_negative_balances() {
        let model = AccountModel::new();
        model.add("alice", Coin::zero()).unwrap();

        assert!(matches!(
            model.add("alice", Coin::zero()),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            model.add("bob", Coin::new(-1.0)),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_address_is_never_a_member() {
        let model = AccountModel::new();
        assert!(!model.exists(""));
        assert!(matches!(
            model.add("", Coin::zero()),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn update_adjusts_balance_and_bumps_nonce() {
        let model = AccountModel::new();
        model.add("alice", Coin::new(10.0)).unwrap();

        model.update("alice", -4.0).unwrap();
        model.update("alice", 1.0).unwrap();

        let account = model.get("alice").unwrap();
        assert_eq!(account.balance, Coin::new(7.0));
        assert_eq!(account.nonce, 2);
    }

    #[test]
    fn update_never_goes_negative() {
        let model = AccountModel::new();
        model.add("alice", Coin::new(3.0)).unwrap();

        let err = model.update("alice", -3.01).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));

        // The failed update must not have touched the account.
        let account = model.get("alice").unwrap();
        assert_eq!(account.balance, Coin::new(3.0));
        assert_eq!(account.nonce, 0);
    }

    #[test]
    fn update_requires_an_existing_account() {
        let model = AccountModel::new();
        assert!(matches!(
            model.update("ghost", 1.0),
            Err(CoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn replay_drains_a_seeded_account() {
        // 100 blocks of 100 one-coin transfers out of a 10000-coin account.
        let model = AccountModel::new();
        model.add("genesis", Coin::new(10_000.0)).unwrap();

        let blocks: Vec<Block> = (0..100)
            .map(|b| {
                block_of(
                    (0..100)
                        .map(|t| transfer("genesis", &format!("peer-{b}-{t}"), 1.0))
                        .collect(),
                )
            })
            .collect();

        model.from_blocks(&blocks);

        let genesis = model.get("genesis").unwrap();
        assert_eq!(genesis.nonce, 10_000);
        assert_eq!(genesis.balance, Coin::zero());
    }

    #[test]
    fn replay_autocreates_unknown_parties() {
        let model = AccountModel::new();
        model.from_blocks(&[block_of(vec![transfer("unknown", "fresh", 5.0)])]);

        let sender = model.get("unknown").unwrap();
        assert_eq!(sender.balance, Coin::zero());
        assert_eq!(sender.nonce, 1);

        let receiver = model.get("fresh").unwrap();
        assert_eq!(receiver.balance, Coin::new(5.0));
        assert_eq!(receiver.nonce, 0);
    }

    #[test]
    fn replay_conserves_total_balance() {
        // Regular transfers among seeded accounts keep the total constant.
        let model = AccountModel::new();
        model.add("a", Coin::new(100.0)).unwrap();
        model.add("b", Coin::new(50.0)).unwrap();

        model.from_blocks(&[block_of(vec![
            transfer("a", "b", 30.0),
            transfer("b", "a", 10.0),
        ])]);

        let total = model.get("a").unwrap().balance.to_f64() + model.get("b").unwrap().balance.to_f64();
        assert_eq!(total, 150.0);
    }

    #[test]
    fn replay_skips_the_receiver_of_a_stake() {
        let model = AccountModel::new();
        model.add("staker", Coin::new(20.0)).unwrap();

        let mut stake = transfer("staker", "", 5.0);
        stake.kind = TxKind::Stake;
        model.from_blocks(&[block_of(vec![stake])]);

        assert_eq!(model.get("staker").unwrap().balance, Coin::new(15.0));
        assert!(!model.exists(""));
        assert_eq!(model.len(), 1);
    }
}
