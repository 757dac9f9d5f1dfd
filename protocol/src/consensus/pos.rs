//! # Proof of Stake
//!
//! One engine instance per node, holding four collections behind a single
//! mutex: the stake registry (peer → locked coins), the current round's
//! validator set, the keys of this node's own staking transactions, and
//! the votes received for the candidate block. Compound operations hold
//! the lock across the whole read-modify-write.
//!
//! ## Election
//!
//! The winner is drawn uniformly from the peers with positive stake. The
//! draw is seeded by the caller with a per-round nonce derived from the
//! chain tip, and the eligible pool is sorted before indexing — so every
//! replica that agrees on the tip elects the same peer without any
//! coordination round.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ledger::coin::Coin;

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// A peer's verdict on a candidate block, sent back on the Consensus
/// reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Hex hash of the candidate block being voted on.
    pub block_hash: String,
    /// Whether the candidate validated against the voter's tip.
    pub valid: bool,
}

// ---------------------------------------------------------------------------
// ProofOfStake
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PosState {
    stakers: HashMap<String, Coin>,
    validators: HashSet<String>,
    stake_keys: HashSet<String>,
    votes: Vec<Vote>,
}

/// The proof-of-stake engine.
#[derive(Debug, Default)]
pub struct ProofOfStake {
    state: Mutex<PosState>,
}

impl ProofOfStake {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Stake registry -----------------------------------------------------

    /// True when the peer has a registry entry.
    pub fn exists(&self, peer: &str) -> bool {
        self.state.lock().stakers.contains_key(peer)
    }

    /// Sets a peer's stake to an absolute value.
    pub fn set(&self, peer: &str, stake: f64) {
        self.state
            .lock()
            .stakers
            .insert(peer.to_string(), Coin::new(stake));
    }

    /// Adjusts a peer's stake by `delta`. Fails when the peer is unknown
    /// or the result would be negative.
    pub fn update(&self, peer: &str, delta: f64) -> Result<()> {
        let mut state = self.state.lock();
        let stake = state
            .stakers
            .get(peer)
            .ok_or_else(|| CoreError::InvalidOperation("node does not exist".into()))?;

        let updated = stake.add(delta);
        if updated.is_negative() {
            return Err(CoreError::InvalidOperation(
                "stake cannot be negative".into(),
            ));
        }

        state.stakers.insert(peer.to_string(), updated);
        Ok(())
    }

    /// Registers a new peer with an initial stake. Fails when the peer
    /// already exists or the stake is negative.
    pub fn add(&self, peer: &str, stake: f64) -> Result<()> {
        if stake < 0.0 {
            return Err(CoreError::InvalidOperation(
                "stake cannot be negative".into(),
            ));
        }

        let mut state = self.state.lock();
        if state.stakers.contains_key(peer) {
            return Err(CoreError::InvalidOperation("node already exists".into()));
        }

        state.stakers.insert(peer.to_string(), Coin::new(stake));
        Ok(())
    }

    /// A peer's current stake.
    pub fn get_stake(&self, peer: &str) -> Result<Coin> {
        self.state
            .lock()
            .stakers
            .get(peer)
            .copied()
            .ok_or_else(|| CoreError::InvalidOperation("node does not exist".into()))
    }

    /// Wipes the stake registry.
    pub fn clear(&self) {
        self.state.lock().stakers.clear();
    }

    // -- Election -----------------------------------------------------------

    /// Draws the forging validator for this round from all peers with
    /// positive stake, using the caller-supplied round seed. Replicas that
    /// pass the same seed and hold the same registry elect the same peer.
    /// Errs when no peer is eligible.
    pub fn winner(&self, seed: u64) -> Result<String> {
        let state = self.state.lock();

        let mut pool: Vec<&String> = state
            .stakers
            .iter()
            .filter(|(_, stake)| stake.to_f64() > 0.0)
            .map(|(peer, _)| peer)
            .collect();

        if pool.is_empty() {
            return Err(CoreError::InvalidOperation("no stakers".into()));
        }

        // Map iteration order is arbitrary; the draw is only replicable
        // over a sorted pool.
        pool.sort();

        let mut rng = StdRng::seed_from_u64(seed);
        let index = rng.gen_range(0..pool.len());
        Ok(pool[index].clone())
    }

    // -- Round bookkeeping --------------------------------------------------

    /// Registers an announced validator for the current round.
    pub fn add_validator(&self, peer: &str) {
        self.state.lock().validators.insert(peer.to_string());
    }

    /// Removes a peer from the round's validator set, reporting whether
    /// it was present.
    pub fn remove_validator(&self, peer: &str) -> bool {
        self.state.lock().validators.remove(peer)
    }

    /// True when the peer announced itself (or was announced) as this
    /// round's validator.
    pub fn is_validator(&self, peer: &str) -> bool {
        self.state.lock().validators.contains(peer)
    }

    /// Remembers the mempool key of a staking transaction created by this
    /// node, so its amount can be released from the registry on commit.
    pub fn track_stake_key(&self, key: String) {
        self.state.lock().stake_keys.insert(key);
    }

    /// Forgets a tracked staking key, reporting whether it was known.
    pub fn remove_stake_key(&self, key: &str) -> bool {
        self.state.lock().stake_keys.remove(key)
    }

    /// Records a vote for the current candidate.
    pub fn push_vote(&self, vote: Vote) {
        self.state.lock().votes.push(vote);
    }

    /// Percentage of valid votes among those received. No votes at all
    /// counts as full approval — a single-peer network self-approves.
    pub fn commit_ratio(&self) -> u64 {
        let state = self.state.lock();
        if state.votes.is_empty() {
            return 100;
        }

        let valid = state.votes.iter().filter(|vote| vote.valid).count() as u64;
        valid * 100 / state.votes.len() as u64
    }

    /// Drops the recorded votes.
    pub fn clear_votes(&self) {
        self.state.lock().votes.clear();
    }

    /// Ends the round: forgets foreign stakes (keeping `keep`'s entry),
    /// the validator set, and the votes.
    pub fn reset_round(&self, keep: &str) {
        let mut state = self.state.lock();
        state.stakers.retain(|peer, _| peer == keep);
        state.validators.clear();
        state.votes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_stake() {
        let pos = ProofOfStake::new();
        pos.set("peer-1", 12.5);

        assert!(pos.exists("peer-1"));
        assert_eq!(pos.get_stake("peer-1").unwrap(), Coin::new(12.5));
        assert!(pos.get_stake("peer-2").is_err());

        pos.clear();
        assert!(!pos.exists("peer-1"));
    }

    #[test]
    fn add_rejects_duplicates_and_negative_stakes() {
        let pos = ProofOfStake::new();
        pos.add("peer-1", 1.0).unwrap();

        assert!(matches!(
            pos.add("peer-1", 1.0),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            pos.add("peer-2", -1.0),
            Err(CoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn update_moves_stake_but_never_below_zero() {
        let pos = ProofOfStake::new();
        pos.set("peer-1", 10.0);

        pos.update("peer-1", -4.0).unwrap();
        assert_eq!(pos.get_stake("peer-1").unwrap(), Coin::new(6.0));

        let err = pos.update("peer-1", -6.5).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation(_)));
        assert_eq!(pos.get_stake("peer-1").unwrap(), Coin::new(6.0));

        assert!(pos.update("ghost", 1.0).is_err());
    }

    #[test]
    fn winner_comes_from_the_positive_pool() {
        let pos = ProofOfStake::new();
        pos.set("rich", 10.0);
        pos.set("broke", 0.0);

        for seed in 0..20 {
            assert_eq!(pos.winner(seed).unwrap(), "rich");
        }
    }

    #[test]
    fn winner_errs_when_nobody_staked() {
        let pos = ProofOfStake::new();
        assert!(pos.winner(7).is_err());

        pos.set("broke", 0.0);
        assert!(matches!(
            pos.winner(7),
            Err(CoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn same_seed_same_winner_across_replicas() {
        let build = || {
            let pos = ProofOfStake::new();
            pos.set("alpha", 5.0);
            pos.set("beta", 5.0);
            pos.set("gamma", 5.0);
            pos
        };

        let left = build();
        let right = build();
        for seed in 0..50 {
            assert_eq!(left.winner(seed).unwrap(), right.winner(seed).unwrap());
        }
    }

    #[test]
    fn different_seeds_spread_the_election() {
        let pos = ProofOfStake::new();
        pos.set("alpha", 5.0);
        pos.set("beta", 5.0);
        pos.set("gamma", 5.0);

        let winners: HashSet<String> = (0..100).map(|seed| pos.winner(seed).unwrap()).collect();
        assert!(winners.len() > 1, "election never varied across 100 seeds");
    }

    #[test]
    fn supermajority_tally() {
        let pos = ProofOfStake::new();

        // 4 of 5 valid: 80% — above threshold.
        for valid in [true, true, true, true, false] {
            pos.push_vote(Vote {
                block_hash: "candidate".into(),
                valid,
            });
        }
        assert_eq!(pos.commit_ratio(), 80);

        // 2 of 5 valid: 40% — below threshold.
        pos.clear_votes();
        for valid in [true, true, false, false, false] {
            pos.push_vote(Vote {
                block_hash: "candidate".into(),
                valid,
            });
        }
        assert_eq!(pos.commit_ratio(), 40);
    }

    #[test]
    fn no_votes_counts_as_full_approval() {
        let pos = ProofOfStake::new();
        assert_eq!(pos.commit_ratio(), 100);
    }

    #[test]
    fn validator_set_round_trip() {
        let pos = ProofOfStake::new();
        pos.add_validator("peer-1");

        assert!(pos.is_validator("peer-1"));
        assert!(pos.remove_validator("peer-1"));
        assert!(!pos.remove_validator("peer-1"));
        assert!(!pos.is_validator("peer-1"));
    }

    #[test]
    fn stake_keys_are_tracked_once() {
        let pos = ProofOfStake::new();
        pos.track_stake_key("key".into());

        assert!(pos.remove_stake_key("key"));
        assert!(!pos.remove_stake_key("key"));
    }

    #[test]
    fn reset_round_keeps_only_self() {
        let pos = ProofOfStake::new();
        pos.set("self", 10.0);
        pos.set("other", 5.0);
        pos.add_validator("other");
        pos.push_vote(Vote {
            block_hash: "candidate".into(),
            valid: true,
        });

        pos.reset_round("self");

        assert!(pos.exists("self"));
        assert!(!pos.exists("other"));
        assert!(!pos.is_validator("other"));
        assert_eq!(pos.commit_ratio(), 100);
    }

    #[test]
    fn vote_wire_form_uses_camel_case() {
        let vote = Vote {
            block_hash: "abc".into(),
            valid: true,
        };
        let json = serde_json::to_string(&vote).unwrap();
        assert_eq!(json, r#"{"blockHash":"abc","valid":true}"#);
    }
}
