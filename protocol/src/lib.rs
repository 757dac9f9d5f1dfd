// Copyright (c) 2026 EMBER contributors. MIT License.
// See LICENSE for details.

//! # EMBER Protocol — Core Library
//!
//! EMBER is a small proof-of-stake blockchain for LAN-scale networks: every
//! node keeps a full replica of the ledger, gossips transactions and blocks
//! to its peers, and once per forge interval the network elects a
//! stake-weighted validator that assembles a candidate block, collects
//! votes, and commits on supermajority agreement.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the subsystems of a node:
//!
//! - **crypto** — SHA-256/Keccak-256 hashing and recoverable secp256k1
//!   signatures. Addresses are hex-encoded uncompressed public keys.
//! - **ledger** — the replicated state: coins, Merkle commitments,
//!   transactions, blocks, the mempool, the account model, and the
//!   chain itself.
//! - **consensus** — the stake registry and the per-round election and
//!   vote tally.
//! - **network** — the gossip overlay (topic pub/sub plus a `/reply`
//!   unicast channel) and the node orchestrator that drives everything.
//! - **config** — protocol constants and network parameters.
//! - **error** — the shared error taxonomy.
//!
//! ## Design notes
//!
//! The ledger is internally synchronized; tasks share one `Arc<Ledger>`
//! handle and only the ledger's own methods mutate it. The consensus
//! engine and the overlay never touch the ledger — the orchestrator is
//! the only component that calls across subsystems.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod network;
