//! Node orchestration: shared chain state, the mining loop, and peer
//! bookkeeping
//!
//! A single `Node` is shared behind `Arc` by the HTTP API, the sync loop,
//! and the mining loop. Lock order is always state before mempool before
//! peers; no task ever takes them in another order.

use crate::block::{Block, Hash};
use crate::config::Config;
use crate::crypto::Account;
use crate::error::{ChainError, Result};
use crate::ledger::State;
use crate::mempool::Mempool;
use crate::miner::{self, PendingBlock};
use crate::transaction::SignedTx;
use crate::{api, sync};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{error, info, warn};

pub const MINING_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerNode {
    pub ip: String,
    pub port: u16,
    pub is_bootstrap: bool,
    pub account: Account,
    pub node_version: String,
    /// True once a handshake with this peer has succeeded. Local only.
    #[serde(skip)]
    pub connected: bool,
}

impl PeerNode {
    pub fn new(
        ip: impl Into<String>,
        port: u16,
        is_bootstrap: bool,
        account: Account,
        node_version: impl Into<String>,
    ) -> Self {
        PeerNode {
            ip: ip.into(),
            port,
            is_bootstrap,
            account,
            node_version: node_version.into(),
            connected: false,
        }
    }

    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

pub struct Node {
    data_dir: PathBuf,
    info: PeerNode,
    version: String,
    mining_enabled: bool,
    mining_difficulty: usize,
    state: Arc<RwLock<State>>,
    mempool: Arc<Mutex<Mempool>>,
    known_peers: Arc<RwLock<HashMap<String, PeerNode>>>,
    is_mining: AtomicBool,
    mining_cancel: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl Node {
    pub fn new(config: &Config, version: &str) -> Result<Node> {
        let data_dir = PathBuf::from(&config.node.data_dir);
        let state = State::new_from_disk(&data_dir, config.miner.difficulty)?;
        let mempool = Mempool::new(&state);

        let miner_account = config.miner.account.unwrap_or_default();
        let info = PeerNode::new(
            config.node.ip.clone(),
            config.node.port,
            config.bootstrap.is_none(),
            miner_account,
            version,
        );

        let mut known_peers = HashMap::new();
        if let Some(bootstrap) = &config.bootstrap {
            let peer = PeerNode::new(
                bootstrap.ip.clone(),
                bootstrap.port,
                true,
                bootstrap.account.unwrap_or_default(),
                "",
            );
            if peer.tcp_address() != info.tcp_address() {
                known_peers.insert(peer.tcp_address(), peer);
            }
        }

        let (shutdown, _) = watch::channel(false);

        Ok(Node {
            data_dir,
            info,
            version: version.to_string(),
            mining_enabled: config.miner.enabled,
            mining_difficulty: config.miner.difficulty,
            state: Arc::new(RwLock::new(state)),
            mempool: Arc::new(Mutex::new(mempool)),
            known_peers: Arc::new(RwLock::new(known_peers)),
            is_mining: AtomicBool::new(false),
            mining_cancel: Arc::new(AtomicBool::new(false)),
            shutdown,
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn info(&self) -> &PeerNode {
        &self.info
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> &Arc<RwLock<State>> {
        &self.state
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Serves the HTTP API and runs the sync and mining loops until
    /// shutdown is signalled.
    pub async fn run(self: Arc<Node>) -> Result<()> {
        info!(
            address = %self.info.tcp_address(),
            version = %self.version,
            mining = self.mining_enabled,
            "Starting node"
        );

        let sync_node = Arc::clone(&self);
        tokio::spawn(async move {
            sync::run(sync_node).await;
        });

        let mine_node = Arc::clone(&self);
        tokio::spawn(async move {
            mine_node.mine_loop().await;
        });

        api::serve(Arc::clone(&self)).await
    }

    /// Validates and commits a block, then prunes the mempool against the
    /// new committed state. Used for both locally mined and synced blocks.
    pub async fn apply_block(&self, block: Block) -> Result<Hash> {
        let mut state = self.state.write().await;
        let hash = state.add_block(block.clone())?;
        let snapshot = state.copy();

        let mut mempool = self.mempool.lock().await;
        mempool.remove_mined(&block, &snapshot);

        info!(
            number = block.header.number,
            %hash,
            txs = block.txs.len(),
            "Block committed"
        );
        Ok(hash)
    }

    /// Entry point for new transactions from the API or from peers.
    /// `from_peer` names the submitting peer, or "local" for wallet traffic.
    pub async fn add_pending_tx(&self, tx: SignedTx, from_peer: &str) -> Result<bool> {
        self.mempool.lock().await.admit(tx, from_peer)
    }

    pub async fn pending_txs(&self) -> Vec<SignedTx> {
        self.mempool.lock().await.pending_txs()
    }

    pub async fn next_account_nonce(&self, account: &Account) -> u64 {
        self.mempool.lock().await.next_account_nonce(account)
    }

    pub async fn known_peers(&self) -> Vec<PeerNode> {
        self.known_peers.read().await.values().cloned().collect()
    }

    pub async fn is_known_peer(&self, peer: &PeerNode) -> bool {
        peer.tcp_address() == self.info.tcp_address()
            || self.known_peers.read().await.contains_key(&peer.tcp_address())
    }

    pub async fn add_peer(&self, peer: PeerNode) {
        if peer.tcp_address() == self.info.tcp_address() {
            return;
        }
        let mut peers = self.known_peers.write().await;
        if !peers.contains_key(&peer.tcp_address()) {
            info!(peer = %peer.tcp_address(), "Discovered new peer");
            peers.insert(peer.tcp_address(), peer);
        }
    }

    pub async fn remove_peer(&self, tcp_address: &str) {
        if self.known_peers.write().await.remove(tcp_address).is_some() {
            warn!(peer = %tcp_address, "Removed unreachable peer");
        }
    }

    pub async fn mark_peer_connected(&self, tcp_address: &str) {
        if let Some(peer) = self.known_peers.write().await.get_mut(tcp_address) {
            peer.connected = true;
        }
    }

    /// Aborts an in-flight mining attempt. Called when a synced block makes
    /// the current attempt stale; the mempool has already been pruned by
    /// `apply_block`.
    pub fn interrupt_mining(&self) {
        if self.is_mining.load(Ordering::Relaxed) {
            info!("New block arrived over sync, cancelling current mining attempt");
            self.mining_cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Periodically kicks off a proof-of-work attempt whenever transactions
    /// are pending and no attempt is already running.
    async fn mine_loop(self: Arc<Node>) {
        if !self.mining_enabled {
            info!("Mining disabled, not starting mining loop");
            return;
        }

        let mut shutdown = self.shutdown_signal();
        let mut ticker = tokio::time::interval(Duration::from_secs(MINING_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.is_mining.load(Ordering::Relaxed) {
                        continue;
                    }
                    if let Err(err) = Arc::clone(&self).mine_pending_txs().await {
                        error!(%err, "Failed to start mining attempt");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Stopping mining loop");
                    return;
                }
            }
        }
    }

    /// Snapshots the pending transactions and chain head, then runs the
    /// hash search on a blocking thread so the async runtime stays live.
    async fn mine_pending_txs(self: Arc<Node>) -> Result<()> {
        // The flags are set while the state lock is still held: a block
        // synced after the snapshot cannot slip in before is_mining is
        // visible, so interrupt_mining always sees this attempt.
        let pending = {
            let state = self.state.read().await;
            let mempool = self.mempool.lock().await;
            let txs = mempool.pending_txs();
            if txs.is_empty() {
                return Ok(());
            }
            self.is_mining.store(true, Ordering::Relaxed);
            self.mining_cancel.store(false, Ordering::Relaxed);
            PendingBlock::new(
                state.latest_block_hash(),
                state.next_block_number(),
                self.info.account,
                txs,
            )
        };

        let node = Arc::clone(&self);
        tokio::spawn(async move {
            let difficulty = node.mining_difficulty;
            let cancel = Arc::clone(&node.mining_cancel);
            let mined = tokio::task::spawn_blocking(move || {
                miner::mine(pending, difficulty, &cancel)
            })
            .await;

            match mined {
                Ok(Ok(block)) => {
                    if let Err(err) = node.apply_block(block).await {
                        error!(%err, "Mined block failed to apply");
                    }
                }
                Ok(Err(ChainError::MiningCancelled)) => {
                    // A synced block superseded this attempt.
                }
                Ok(Err(err)) => error!(%err, "Mining failed"),
                Err(err) => error!(%err, "Mining task panicked"),
            }

            node.is_mining.store(false, Ordering::Relaxed);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MinerConfig, NodeConfig};
    use crate::crypto::KeyPair;
    use crate::genesis::Genesis;
    use crate::ledger;
    use crate::transaction::Tx;
    use tempfile::TempDir;

    const TEST_DIFFICULTY: usize = 1;

    fn test_node(dir: &TempDir, miner_key: &KeyPair) -> Arc<Node> {
        ledger::init_data_dir(dir.path(), &Genesis::default_devnet(miner_key.account())).unwrap();
        let config = Config {
            node: NodeConfig {
                data_dir: dir.path().to_string_lossy().into_owned(),
                ip: "127.0.0.1".to_string(),
                port: 8080,
            },
            miner: MinerConfig {
                account: Some(miner_key.account()),
                difficulty: TEST_DIFFICULTY,
                enabled: true,
            },
            bootstrap: None,
        };
        Arc::new(Node::new(&config, "test").unwrap())
    }

    #[tokio::test]
    async fn test_synced_block_cancels_inflight_mining() {
        let alice_key = KeyPair::generate();
        let alice = alice_key.account();
        let bob_key = KeyPair::generate();
        let bob = bob_key.account();
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir, &alice_key);

        let tx1 = SignedTx::sign(Tx::new(alice, bob, 100, 1, ""), &alice_key).unwrap();
        let tx2 = SignedTx::sign(Tx::new(alice, bob, 200, 2, ""), &alice_key).unwrap();
        node.add_pending_tx(tx1.clone(), "local").await.unwrap();
        node.add_pending_tx(tx2.clone(), "local").await.unwrap();

        // A local attempt over both txs, searching at a difficulty it will
        // never satisfy, so it is still in flight when the peer block lands.
        let pending = PendingBlock::new(Hash::empty(), 0, alice, vec![tx1.clone(), tx2.clone()]);
        node.is_mining.store(true, Ordering::Relaxed);
        node.mining_cancel.store(false, Ordering::Relaxed);
        let cancel = Arc::clone(&node.mining_cancel);
        let attempt = tokio::task::spawn_blocking(move || miner::mine(pending, 31, &cancel));

        // A peer wins the race with a block containing only the first tx.
        // This is exactly what the sync loop does on a fetched block.
        let competing = miner::mine(
            PendingBlock::new(Hash::empty(), 0, bob, vec![tx1]),
            TEST_DIFFICULTY,
            &std::sync::atomic::AtomicBool::new(false),
        )
        .unwrap();
        node.apply_block(competing).await.unwrap();
        node.interrupt_mining();

        let outcome = attempt.await.unwrap();
        assert!(matches!(outcome, Err(ChainError::MiningCancelled)));

        // The confirmed tx is gone; only the second waits for the next tick.
        let remaining = node.pending_txs().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash(), tx2.hash());
        assert_eq!(node.state().read().await.next_block_number(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_mining_noop_when_idle() {
        let alice_key = KeyPair::generate();
        let dir = TempDir::new().unwrap();
        let node = test_node(&dir, &alice_key);

        node.interrupt_mining();
        assert!(!node.mining_cancel.load(Ordering::Relaxed));
    }
}
