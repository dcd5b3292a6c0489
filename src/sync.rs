//! Peer synchronization loop
//!
//! Every cycle each known peer is asked for its status; unreachable peers
//! are forgotten. From a reachable peer the node performs a handshake if
//! needed, pulls any blocks past its own head, merges the peer's peer list,
//! and adopts the peer's pending transactions.

use crate::api::{AddPeerRes, StatusRes, SyncRes};
use crate::error::{ChainError, Result};
use crate::node::Node;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SYNC_INTERVAL_SECS: u64 = 45;
const REQUEST_TIMEOUT_SECS: u64 = 10;

pub async fn run(node: Arc<Node>) {
    let client = reqwest::Client::new();
    let mut shutdown = node.shutdown_signal();
    let mut ticker = tokio::time::interval(Duration::from_secs(SYNC_INTERVAL_SECS));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                do_sync(&client, &node).await;
            }
            _ = shutdown.changed() => {
                info!("Stopping sync loop");
                return;
            }
        }
    }
}

async fn do_sync(client: &reqwest::Client, node: &Arc<Node>) {
    for peer in node.known_peers().await {
        if peer.ip.is_empty() {
            continue;
        }
        let addr = peer.tcp_address();

        let status = match query_peer_status(client, &addr).await {
            Ok(status) => status,
            Err(err) => {
                warn!(peer = %addr, %err, "Peer unreachable, forgetting it");
                node.remove_peer(&addr).await;
                continue;
            }
        };

        if let Err(err) = join_known_peers(client, node, &peer).await {
            warn!(peer = %addr, %err, "Handshake failed");
            continue;
        }

        if let Err(err) = sync_blocks(client, node, &addr, &status).await {
            warn!(peer = %addr, %err, "Block sync failed");
        }

        sync_known_peers(node, &status).await;
        sync_pending_txs(node, &addr, status).await;
    }
}

async fn query_peer_status(client: &reqwest::Client, addr: &str) -> Result<StatusRes> {
    let url = format!("http://{}/node/status", addr);
    let status = client
        .get(&url)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .send()
        .await?
        .error_for_status()
        .map_err(|e| ChainError::Network(format!("Status query to {} failed: {}", addr, e)))?
        .json::<StatusRes>()
        .await?;

    Ok(status)
}

/// One-time handshake so the peer learns this node's address too.
async fn join_known_peers(client: &reqwest::Client, node: &Arc<Node>, peer: &crate::node::PeerNode) -> Result<()> {
    if peer.connected {
        return Ok(());
    }

    let info = node.info();
    let url = format!(
        "http://{}/node/peer?ip={}&port={}&miner={}&version={}",
        peer.tcp_address(),
        info.ip,
        info.port,
        info.account,
        node.version(),
    );

    let res = client
        .get(&url)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .send()
        .await?
        .json::<AddPeerRes>()
        .await?;

    if !res.success {
        return Err(ChainError::Network(format!(
            "Peer {} refused handshake: {}",
            peer.tcp_address(),
            res.error
        )));
    }

    node.mark_peer_connected(&peer.tcp_address()).await;
    Ok(())
}

/// Pulls and applies every block past the local head, one at a time so a
/// bad block aborts the batch without corrupting anything.
async fn sync_blocks(
    client: &reqwest::Client,
    node: &Arc<Node>,
    addr: &str,
    status: &StatusRes,
) -> Result<()> {
    if status.block_hash.is_empty() {
        return Ok(());
    }

    let (local_hash, local_height) = {
        let state = node.state().read().await;
        (state.latest_block_hash(), state.next_block_number())
    };

    let peer_height = status.block_number + 1;
    if peer_height <= local_height {
        return Ok(());
    }

    info!(
        peer = %addr,
        behind = peer_height - local_height,
        "Local chain is behind, syncing blocks"
    );

    let url = format!("http://{}/node/sync?fromBlock={}", addr, local_hash.to_hex());
    let res = client
        .get(&url)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .send()
        .await?
        .json::<SyncRes>()
        .await?;

    for block in res.blocks {
        let number = block.header.number;
        node.apply_block(block).await.map_err(|err| {
            ChainError::InvalidBlock(format!("Synced block {} rejected: {}", number, err))
        })?;
        node.interrupt_mining();
    }

    Ok(())
}

async fn sync_known_peers(node: &Arc<Node>, status: &StatusRes) {
    for peer in status.peers_known.values() {
        if !node.is_known_peer(peer).await {
            node.add_peer(peer.clone()).await;
        }
    }
}

/// Adopts the peer's pending transactions. Ones this node already has or
/// considers invalid are skipped.
async fn sync_pending_txs(node: &Arc<Node>, addr: &str, status: StatusRes) {
    for tx in status.pending_txs {
        let hash = tx.hash();
        match node.add_pending_tx(tx, addr).await {
            Ok(true) => {}
            Ok(false) => debug!(tx = %hash, "Already have peer TX"),
            Err(err) => debug!(tx = %hash, %err, "Rejected peer TX"),
        }
    }
}
