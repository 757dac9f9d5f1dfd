//! Proof-of-stake consensus: the stake registry, the per-round election,
//! and the candidate-block vote tally.

pub mod pos;

pub use pos::{ProofOfStake, Vote};
