//! # Node Orchestrator
//!
//! The `Node` ties the subsystems together and is the only component that
//! calls across them. It owns the overlay, the ledger and the PoS engine,
//! and runs three long-lived tasks:
//!
//! - **setup** (one-shot) — bootstrap: load any cached snapshot, solicit
//!   chains from peers, adopt the longest, fall back to the snapshot and
//!   finally to a fresh genesis.
//! - **listener** — multiplexes the six topic channels and dispatches.
//! - **scheduler** — the forge tick: solicit stakes, elect, announce, and
//!   forge when elected.
//!
//! A fourth short-lived task demultiplexes the `/reply` stream into the
//! bootstrap candidates, the vote tally and the stake registry.
//!
//! Gossip traffic never crashes the node: every malformed or rejected
//! message is logged and dropped. A single shutdown signal bounds every
//! loop, and all waits are timer-bounded, so shutdown completes within
//! one reply window.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config;
use crate::consensus::pos::{ProofOfStake, Vote};
use crate::crypto::hash::sha256;
use crate::error::Result;
use crate::ledger::blockchain::{Ledger, LedgerSnapshot};
use crate::ledger::transaction::{Transaction, TxKind};
use crate::network::message::{Message, Payload, Topic};
use crate::network::overlay::GossipOverlay;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Static node configuration, resolved before startup.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// P2P listen port (0 picks a free port).
    pub port: u16,
    /// Interval between forge rounds.
    pub forge_interval: Duration,
    /// Maximum transactions drained into a candidate block.
    pub max_block_transactions: usize,
    /// Where the ledger snapshot is dumped at shutdown.
    pub snapshot_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: config::DEFAULT_P2P_PORT,
            forge_interval: Duration::from_secs(config::DEFAULT_FORGE_INTERVAL_SECS),
            max_block_transactions: config::MAX_BLOCK_TRANSACTIONS,
            snapshot_path: PathBuf::from(config::SNAPSHOT_FILE),
        }
    }
}

/// The topic channels the listener multiplexes.
struct Subscriptions {
    transaction: mpsc::UnboundedReceiver<Message>,
    block: mpsc::UnboundedReceiver<Message>,
    blockchain: mpsc::UnboundedReceiver<Message>,
    consensus: mpsc::UnboundedReceiver<Message>,
    stake: mpsc::UnboundedReceiver<Message>,
    validator: mpsc::UnboundedReceiver<Message>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A running EMBER node.
pub struct Node {
    overlay: GossipOverlay,
    ledger: Arc<Ledger>,
    pos: Arc<ProofOfStake>,
    config: NodeConfig,
    shutdown: watch::Sender<bool>,
    candidates: Mutex<Vec<LedgerSnapshot>>,
    forging: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Brings up the overlay and spawns the node tasks. Failure to start
    /// the overlay is fatal; everything after that degrades gracefully.
    pub async fn start(config: NodeConfig) -> Result<Arc<Self>> {
        let overlay = GossipOverlay::start(config.port).await?;
        let (shutdown, _) = watch::channel(false);

        let node = Arc::new(Self {
            overlay,
            ledger: Arc::new(Ledger::new()),
            pos: Arc::new(ProofOfStake::new()),
            config,
            shutdown,
            candidates: Mutex::new(Vec::new()),
            forging: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        // Subscribe before any task runs so no early message is missed.
        let subscriptions = Subscriptions {
            transaction: node.overlay.subscribe(Topic::Transaction),
            block: node.overlay.subscribe(Topic::Block),
            blockchain: node.overlay.subscribe(Topic::Blockchain),
            consensus: node.overlay.subscribe(Topic::Consensus),
            stake: node.overlay.subscribe(Topic::Stake),
            validator: node.overlay.subscribe(Topic::Validator),
        };

        let mut tasks = Vec::new();

        if let Some(replies) = node.overlay.take_replies() {
            let this = Arc::clone(&node);
            tasks.push(tokio::spawn(async move {
                this.demultiplex_replies(replies).await;
            }));
        }

        let this = Arc::clone(&node);
        tasks.push(tokio::spawn(async move {
            this.listen(subscriptions).await;
        }));

        let this = Arc::clone(&node);
        tasks.push(tokio::spawn(async move {
            this.bootstrap().await;
        }));

        let this = Arc::clone(&node);
        tasks.push(tokio::spawn(async move {
            this.schedule().await;
        }));

        *node.tasks.lock() = tasks;
        Ok(node)
    }

    /// This node's peer identifier on the overlay.
    pub fn id(&self) -> &str {
        self.overlay.id()
    }

    /// The shared ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.overlay.connected_peers()
    }

    /// This node's own registered stake, zero when it never staked.
    pub fn own_stake(&self) -> f64 {
        self.pos
            .get_stake(self.id())
            .map(|stake| stake.to_f64())
            .unwrap_or(0.0)
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Syncs the ledger: cached snapshot as fallback, then the longest
    /// chain any peer offers within the reply window, then genesis.
    async fn bootstrap(&self) {
        let cached = Ledger::load(&self.config.snapshot_path).ok();
        if cached.is_some() {
            info!(path = %self.config.snapshot_path.display(), "loaded cached snapshot");
        }

        tokio::time::sleep(config::BOOTSTRAP_GRACE).await;

        if self.overlay.connected_peers() > 0 {
            self.overlay.request(Topic::Blockchain);
            tokio::time::sleep(config::REPLY_WINDOW).await;
        }

        let offered = std::mem::take(&mut *self.candidates.lock());
        let mut best: Option<LedgerSnapshot> = None;
        for candidate in offered {
            // Strictly longer wins; ties keep the first seen.
            let longer = best
                .as_ref()
                .map(|b| candidate.blocks.len() > b.blocks.len())
                .unwrap_or(true);
            if longer {
                best = Some(candidate);
            }
        }

        let adopted = best.or(cached).map(|s| s.blocks).unwrap_or_default();

        match self.ledger.init(self.id(), adopted) {
            Ok(()) => info!(height = self.ledger.len(), "ledger ready"),
            Err(e) => warn!(error = %e, "ledger initialization failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Reply demultiplexer
    // -----------------------------------------------------------------------

    /// Routes inbound `/reply` messages by topic: chains feed the
    /// bootstrap candidates, votes feed the tally, stakes feed the
    /// registry. Ends when the overlay closes.
    async fn demultiplex_replies(&self, mut replies: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = replies.recv().await {
            match message.decode_reply() {
                Ok(Payload::Chain(snapshot)) => {
                    debug!(peer = %message.peer, blocks = snapshot.blocks.len(), "chain offered");
                    self.candidates.lock().push(snapshot);
                }
                Ok(Payload::Vote(vote)) => self.pos.push_vote(vote),
                Ok(Payload::Stake(stake)) => self.pos.set(&message.peer, stake),
                Ok(_) => {}
                Err(e) => debug!(peer = %message.peer, error = %e, "ignoring malformed reply"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Listener
    // -----------------------------------------------------------------------

    /// Multiplexes the topic channels until shutdown.
    async fn listen(self: Arc<Self>, mut subs: Subscriptions) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(message) = subs.transaction.recv() => self.on_transaction(message),
                Some(message) = subs.block.recv() => self.on_block(message),
                Some(message) = subs.blockchain.recv() => self.on_blockchain(message),
                Some(message) = subs.consensus.recv() => self.on_consensus(message),
                Some(message) = subs.stake.recv() => self.on_stake(message),
                Some(message) = subs.validator.recv() => Arc::clone(&self).on_validator(&message),
                else => break,
            }
        }
    }

    /// A peer gossiped a transaction: admit it like a local one.
    fn on_transaction(&self, message: Message) {
        match message.decode() {
            Ok(Payload::Transaction(tx)) => {
                if let Err(e) = self.ledger.receive_transaction(tx) {
                    warn!(peer = %message.peer, error = %e, "transaction rejected");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(peer = %message.peer, error = %e, "undecodable transaction"),
        }
    }

    /// A peer committed a block. The sender is normally in the announced
    /// validator set; a block from a peer we never saw announced is still
    /// applied when it validates against the tip, so a node that missed
    /// the announcement converges.
    fn on_block(&self, message: Message) {
        let block = match message.decode() {
            Ok(Payload::Block(block)) => block,
            Ok(_) => return,
            Err(e) => {
                warn!(peer = %message.peer, error = %e, "undecodable block");
                return;
            }
        };

        if !self.pos.remove_validator(&message.peer) {
            debug!(peer = %message.peer, "block from unannounced validator");
        }

        match self.ledger.add_block(block, &message.peer) {
            Ok(()) => info!(peer = %message.peer, height = self.ledger.len(), "block applied"),
            Err(e) => warn!(peer = %message.peer, error = %e, "block rejected"),
        }
    }

    /// A peer asked for the chain: reply with the full snapshot, unless
    /// this node has nothing yet.
    fn on_blockchain(&self, message: Message) {
        if self.ledger.is_empty() {
            return;
        }
        match Payload::Chain(self.ledger.snapshot()).encode() {
            Ok(payload) => self.overlay.reply(&message.peer, Topic::Blockchain, payload),
            Err(e) => warn!(error = %e, "could not encode chain"),
        }
    }

    /// A peer solicited stakes: reply with ours.
    fn on_stake(&self, message: Message) {
        let payload = self.own_stake().to_string();
        self.overlay.reply(&message.peer, Topic::Stake, payload);
    }

    /// A candidate block arrived: validate it against our tip and send
    /// the verdict back to the forger.
    fn on_consensus(&self, message: Message) {
        let candidate = match message.decode() {
            Ok(Payload::Block(block)) => block,
            Ok(_) => return,
            Err(e) => {
                warn!(peer = %message.peer, error = %e, "undecodable candidate");
                return;
            }
        };

        let valid = match self.ledger.last_block() {
            Ok(last) => candidate.validate(&last, &message.peer).is_ok(),
            Err(_) => false,
        };

        let vote = Vote {
            block_hash: candidate.hash_hex(),
            valid,
        };
        debug!(peer = %message.peer, valid, "voting on candidate");

        match serde_json::to_string(&vote) {
            Ok(payload) => self.overlay.reply(&message.peer, Topic::Consensus, payload),
            Err(e) => warn!(error = %e, "could not encode vote"),
        }
    }

    /// An elected validator was announced. Remember it; if it is us,
    /// start forging.
    fn on_validator(self: Arc<Self>, message: &Message) {
        let elected = match message.decode() {
            Ok(Payload::Validator(peer)) => peer,
            _ => return,
        };

        self.pos.add_validator(&elected);
        if elected == self.id() {
            tokio::spawn(async move {
                self.forge().await;
            });
        }
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// The forge tick. The first round starts one full interval after
    /// startup, leaving the bootstrap time to finish.
    async fn schedule(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.config.forge_interval);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => Arc::clone(&self).round().await,
            }
        }
    }

    /// One election round: solicit stakes, elect, announce, forge if
    /// elected.
    async fn round(self: Arc<Self>) {
        if self.ledger.is_empty() {
            debug!("ledger not ready, skipping round");
            return;
        }

        self.overlay.request(Topic::Stake);
        tokio::time::sleep(config::REPLY_WINDOW).await;

        let winner = match self.pos.winner(self.election_seed()) {
            Ok(winner) => winner,
            Err(e) => {
                debug!(error = %e, "electing self");
                self.id().to_string()
            }
        };

        self.overlay
            .publish(Topic::Validator, winner.clone());
        self.pos.add_validator(&winner);
        info!(%winner, "validator elected");

        if winner == self.id() {
            Arc::clone(&self).forge().await;
        }
    }

    /// The per-round election nonce: derived from the chain tip, so every
    /// replica that agrees on the tip draws the same winner.
    fn election_seed(&self) -> u64 {
        let Ok(last) = self.ledger.last_block() else {
            return 0;
        };

        let mut data = last.hash().to_vec();
        data.extend_from_slice(&(self.ledger.len() as u64).to_le_bytes());
        let digest = sha256(&data);

        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(seed)
    }

    // -----------------------------------------------------------------------
    // Forge
    // -----------------------------------------------------------------------

    /// Assembles a candidate, collects votes, and commits on
    /// supermajority. The initial delay lets the Validator announcement
    /// settle before the candidate arrives anywhere.
    async fn forge(self: Arc<Self>) {
        if self.forging.swap(true, Ordering::SeqCst) {
            debug!("forge already in progress");
            return;
        }

        tokio::time::sleep(config::FORGE_DELAY).await;
        self.pos.clear_votes();

        let candidate = match self
            .ledger
            .create_block(self.id(), self.config.max_block_transactions)
        {
            Ok(block) => block,
            Err(e) => {
                info!(error = %e, "nothing to forge");
                self.forging.store(false, Ordering::SeqCst);
                return;
            }
        };

        match Payload::Block(candidate.clone()).encode() {
            Ok(payload) => self.overlay.publish(Topic::Consensus, payload),
            Err(e) => warn!(error = %e, "could not encode candidate"),
        }

        tokio::time::sleep(config::REPLY_WINDOW).await;

        let ratio = self.pos.commit_ratio();
        if ratio >= config::COMMIT_THRESHOLD_PERCENT {
            match self.ledger.add_block(candidate.clone(), self.id()) {
                Ok(()) => {
                    if let Ok(payload) = Payload::Block(candidate.clone()).encode() {
                        self.overlay.publish(Topic::Block, payload);
                    }
                    self.release_committed_stakes(&candidate);
                    self.pos.reset_round(self.id());
                    info!(height = self.ledger.len(), ratio, "block committed");
                }
                Err(e) => warn!(error = %e, "could not commit own candidate"),
            }
        } else {
            info!(ratio, "candidate rejected by vote");
            self.pos.clear_votes();
            self.pos.remove_validator(self.id());
        }

        self.forging.store(false, Ordering::SeqCst);
    }

    /// Releases this node's staking transactions that made it into the
    /// committed block: their amounts leave the stake registry.
    fn release_committed_stakes(&self, block: &crate::ledger::block::Block) {
        for tx in &block.transactions {
            if tx.kind != TxKind::Stake {
                continue;
            }
            if self.pos.remove_stake_key(&tx.canonical_string()) {
                if let Err(e) = self.pos.update(self.id(), -tx.amount) {
                    warn!(error = %e, "could not release committed stake");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // External operations
    // -----------------------------------------------------------------------

    /// Creates a transaction on behalf of an external caller, gossips it,
    /// and — for stakes — registers the amount as this node's election
    /// stake.
    pub fn create_transaction(
        &self,
        sender: &str,
        receiver: &str,
        signature: &str,
        amount: f64,
        kind: TxKind,
    ) -> Result<Transaction> {
        let tx = self
            .ledger
            .create_transaction(sender, receiver, signature, amount, kind)?;

        if tx.kind == TxKind::Stake {
            let registered = if self.pos.exists(self.id()) {
                self.pos.update(self.id(), amount)
            } else {
                self.pos.add(self.id(), amount)
            };
            if let Err(e) = registered {
                warn!(error = %e, "could not register stake");
            }
            self.pos.track_stake_key(tx.canonical_string());
        }

        match Payload::Transaction(tx.clone()).encode() {
            Ok(payload) => self.overlay.publish(Topic::Transaction, payload),
            Err(e) => warn!(error = %e, "could not gossip transaction"),
        }

        Ok(tx)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Graceful shutdown: signal every loop, close the overlay, dump the
    /// snapshot, join the tasks. A snapshot write failure is logged and
    /// shutdown proceeds.
    pub async fn shutdown(&self) {
        warn!("node: shutting down");
        let _ = self.shutdown.send(true);

        self.overlay.close().await;

        if let Err(e) = self.ledger.dump(&self.config.snapshot_path) {
            tracing::error!(error = %e, "snapshot write failed");
        } else {
            info!(path = %self.config.snapshot_path.display(), "ledger dumped");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!("node: terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    fn test_config(dir: &std::path::Path) -> NodeConfig {
        NodeConfig {
            port: 0,
            // Long enough that no round fires during a test.
            forge_interval: Duration::from_secs(3600),
            max_block_transactions: 100,
            snapshot_path: dir.join("blockchain.json"),
        }
    }

    async fn started(dir: &std::path::Path) -> Arc<Node> {
        let node = Node::start(test_config(dir)).await.expect("node start");
        // Worst-case bootstrap: grace period plus a full reply window
        // (mDNS may surface unrelated local swarms).
        tokio::time::sleep(config::BOOTSTRAP_GRACE + config::REPLY_WINDOW + Duration::from_millis(500))
            .await;
        node
    }

    /// One sequential lifecycle pass. Kept as a single test so at most
    /// one node is alive at a time — concurrently running nodes discover
    /// each other over mDNS and would sync from one another.
    #[tokio::test]
    async fn node_lifecycle() {
        let dir = tempfile::tempdir().unwrap().into_path();

        // -- Lone bootstrap ends in a fresh genesis -------------------------
        let node = started(&dir).await;
        assert_eq!(node.ledger().len(), 1);
        assert_eq!(node.own_stake(), 0.0);
        let genesis_hash = node.ledger().last_block().unwrap().hash_hex();

        // -- A stake transaction registers election stake -------------------
        let keypair = Keypair::generate();
        let address = keypair.address();
        node.ledger().update_account_model(&address, 100.0).unwrap();

        let preimage = Transaction::signing_preimage(&address, "", 25.0);
        let signature = keypair.sign(preimage.as_bytes()).unwrap();
        let tx = node
            .create_transaction(&address, "", &signature, 25.0, TxKind::Stake)
            .unwrap();

        assert_eq!(tx.kind, TxKind::Stake);
        assert_eq!(node.own_stake(), 25.0);
        assert_eq!(node.ledger().pending(), 1);

        // -- Shutdown dumps the snapshot ------------------------------------
        node.shutdown().await;
        assert!(dir.join("blockchain.json").exists());

        // -- A restart adopts the dumped chain ------------------------------
        let node = started(&dir).await;
        assert_eq!(node.ledger().last_block().unwrap().hash_hex(), genesis_hash);
        node.shutdown().await;
    }
}
