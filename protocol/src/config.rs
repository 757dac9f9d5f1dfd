//! # Protocol Constants
//!
//! Every magic number in EMBER lives here. Changing any of the consensus
//! constants after a network has launched will split it, so treat this file
//! as part of the wire format.

use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Protocol version, baked in at compile time.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Number of fractional digits a [`crate::ledger::Coin`] carries.
/// Two, like cents. Every amount entering the system is rescaled to this.
pub const COIN_SCALE: u32 = 2;

/// Total supply minted into the genesis account. There is no inflation:
/// every coin in circulation traces back to the genesis Exchange
/// transaction.
pub const MAX_SUPPLY: f64 = 100_000_000.0;

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// The devnet genesis signing key. The public half (the genesis address)
/// is derived from this scalar at runtime; the genesis block's single
/// Exchange transaction mints [`MAX_SUPPLY`] to it.
///
/// This key is public by construction. A production network would embed
/// only the address and keep the scalar in cold storage.
pub const GENESIS_PRIVATE_KEY: &str =
    "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35";

/// Fixed timestamp of the genesis block (2024-01-01T00:00:00Z). A constant
/// so every node derives a byte-identical genesis block.
pub const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

// ---------------------------------------------------------------------------
// Networking
// ---------------------------------------------------------------------------

/// Default P2P listen port.
pub const DEFAULT_P2P_PORT: u16 = 30333;

/// Default port for the external HTTP API.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Default DNS seed (`host:port`) pinged once at startup.
pub const DEFAULT_DNS_SEED: &str = "localhost:3000";

/// Protocol name of the unicast reply channel.
pub const REPLY_PROTOCOL: &str = "/reply";

// ---------------------------------------------------------------------------
// Consensus timing
// ---------------------------------------------------------------------------

/// Default forge tick interval, as the textual form accepted by the CLI.
pub const DEFAULT_FORGE_INTERVAL: &str = "20m";

/// Default forge tick interval in seconds, used when the textual form
/// fails to parse.
pub const DEFAULT_FORGE_INTERVAL_SECS: u64 = 20 * 60;

/// How long the node waits for peers to answer a request (stake
/// solicitation, chain download, candidate votes). Replies arriving after
/// the window are ignored.
pub const REPLY_WINDOW: Duration = Duration::from_secs(5);

/// Grace period after startup before the bootstrap decides whether any
/// peers are reachable. mDNS discovery needs a moment.
pub const BOOTSTRAP_GRACE: Duration = Duration::from_secs(1);

/// Delay between the Validator announcement and the forge, so every peer
/// has registered the elected identity before the candidate block arrives.
pub const FORGE_DELAY: Duration = Duration::from_secs(5);

/// Maximum number of transactions drained into a forged block.
pub const MAX_BLOCK_TRANSACTIONS: usize = 1000;

/// Percentage of valid votes required to commit a candidate block.
pub const COMMIT_THRESHOLD_PERCENT: u64 = 66;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// File the ledger snapshot is dumped to at shutdown, relative to the
/// working directory.
pub const SNAPSHOT_FILE: &str = "blockchain.json";

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Current Unix time in seconds. Timestamps throughout the protocol are
/// second-granular.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_key_is_a_valid_scalar() {
        let bytes = hex::decode(GENESIS_PRIVATE_KEY).expect("genesis key must be hex");
        assert_eq!(bytes.len(), 32);
        assert!(bytes.iter().any(|b| *b != 0));
    }

    #[test]
    fn timing_constants_sanity() {
        // The vote window must fit inside a forge round several times over,
        // otherwise rounds overlap.
        assert!(REPLY_WINDOW.as_secs() * 4 < DEFAULT_FORGE_INTERVAL_SECS);
        assert!(COMMIT_THRESHOLD_PERCENT > 50);
        assert!(COMMIT_THRESHOLD_PERCENT <= 100);
    }

    #[test]
    fn unix_now_is_recent() {
        // 2024-01-01 — if this fails, the clock is broken, not the code.
        assert!(unix_now() > GENESIS_TIMESTAMP);
    }
}
