//! Integration tests for the HTTP API endpoints
//!
//! Each test boots a node over a throwaway data dir and drives it through
//! the public JSON routes.

use axum_test::TestServer;
use emberchain::api::{build_router, BalancesRes, BlockRes, StatusRes, SyncRes, TxAddRes};
use emberchain::config::{BootstrapConfig, Config, MinerConfig, NodeConfig};
use emberchain::crypto::{Account, KeyPair};
use emberchain::genesis::Genesis;
use emberchain::ledger;
use emberchain::node::Node;
use emberchain::wallet;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const TEST_DIFFICULTY: usize = 1;

fn test_config(dir: &TempDir, miner: Option<Account>) -> Config {
    Config {
        node: NodeConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ip: "127.0.0.1".to_string(),
            port: 8080,
        },
        miner: MinerConfig {
            account: miner,
            difficulty: TEST_DIFFICULTY,
            enabled: false,
        },
        bootstrap: None,
    }
}

/// Node with a keystore account funded by genesis.
fn funded_node(dir: &TempDir) -> (Arc<Node>, Account) {
    let funded = wallet::new_account(dir.path()).unwrap();
    ledger::init_data_dir(dir.path(), &Genesis::default_devnet(funded)).unwrap();

    let config = test_config(dir, Some(funded));
    let node = Arc::new(Node::new(&config, "test").unwrap());
    (node, funded)
}

#[tokio::test]
async fn test_balances_and_status() {
    let dir = TempDir::new().unwrap();
    let (node, funded) = funded_node(&dir);
    let server = TestServer::new(build_router(node)).unwrap();

    let response = server.get("/balances/list").await;
    assert_eq!(response.status_code(), 200);
    let balances: BalancesRes = response.json();
    assert!(balances.block_hash.is_empty());
    assert_eq!(balances.balances[&funded], 1_000_000);

    let response = server.get("/node/status").await;
    assert_eq!(response.status_code(), 200);
    let status: StatusRes = response.json();
    assert!(status.block_hash.is_empty());
    assert_eq!(status.block_number, 0);
    assert!(status.pending_txs.is_empty());
    assert_eq!(status.node_version, "test");
    assert_eq!(status.account, funded);
}

#[tokio::test]
async fn test_tx_add_queues_pending() {
    let dir = TempDir::new().unwrap();
    let (node, funded) = funded_node(&dir);
    let bob = KeyPair::generate().account();
    let server = TestServer::new(build_router(Arc::clone(&node))).unwrap();

    let response = server
        .post("/tx/add")
        .json(&json!({
            "from": funded.to_string(),
            "to": bob.to_string(),
            "value": 2000,
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let res: TxAddRes = response.json();
    assert!(res.success);

    let pending = node.pending_txs().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tx.value, 2000);
    assert_eq!(pending[0].tx.nonce, 1);
    assert!(pending[0].is_authentic().unwrap());

    // A second submission chains on the pending nonce.
    let response = server
        .post("/tx/add")
        .json(&json!({
            "from": funded.to_string(),
            "to": bob.to_string(),
            "value": 100,
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(node.pending_txs().await.len(), 2);
}

#[tokio::test]
async fn test_tx_add_rejects_overdraft() {
    let dir = TempDir::new().unwrap();
    let (node, funded) = funded_node(&dir);
    let bob = KeyPair::generate().account();
    let server = TestServer::new(build_router(Arc::clone(&node))).unwrap();

    let response = server
        .post("/tx/add")
        .json(&json!({
            "from": funded.to_string(),
            "to": bob.to_string(),
            "value": 2_000_000,
        }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].is_string());
    assert!(node.pending_txs().await.is_empty());
}

#[tokio::test]
async fn test_tx_add_unknown_sender_fails() {
    let dir = TempDir::new().unwrap();
    let (node, _) = funded_node(&dir);
    let stranger = KeyPair::generate().account();
    let server = TestServer::new(build_router(node)).unwrap();

    // No key in the keystore for this account.
    let response = server
        .post("/tx/add")
        .json(&json!({
            "from": stranger.to_string(),
            "to": stranger.to_string(),
            "value": 1,
        }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_sync_and_block_lookup() {
    let dir = TempDir::new().unwrap();
    let (node, funded) = funded_node(&dir);
    let bob = KeyPair::generate().account();
    let server = TestServer::new(build_router(Arc::clone(&node))).unwrap();

    // Queue and mine one block directly through the node.
    let keypair = wallet::load_keypair(dir.path(), &funded).unwrap();
    let tx = emberchain::transaction::SignedTx::sign(
        emberchain::transaction::Tx::new(funded, bob, 500, 1, ""),
        &keypair,
    )
    .unwrap();
    node.add_pending_tx(tx.clone(), "local").await.unwrap();

    let pending = emberchain::miner::PendingBlock::new(
        emberchain::block::Hash::empty(),
        0,
        funded,
        vec![tx],
    );
    let block = emberchain::miner::mine(
        pending,
        TEST_DIFFICULTY,
        &std::sync::atomic::AtomicBool::new(false),
    )
    .unwrap();
    let hash = node.apply_block(block).await.unwrap();

    // Empty fromBlock serves the whole chain.
    let response = server.get("/node/sync").add_query_param("fromBlock", "").await;
    assert_eq!(response.status_code(), 200);
    let res: SyncRes = response.json();
    assert_eq!(res.blocks.len(), 1);
    assert_eq!(res.blocks[0].hash(), hash);

    // From the tip there is nothing new.
    let response = server
        .get("/node/sync")
        .add_query_param("fromBlock", hash.to_hex())
        .await;
    let res: SyncRes = response.json();
    assert!(res.blocks.is_empty());

    // Lookup by hash and by height agree.
    let response = server.get(&format!("/block/{}", hash.to_hex())).await;
    assert_eq!(response.status_code(), 200);
    let by_hash: BlockRes = response.json();
    assert_eq!(by_hash.hash, hash);

    let response = server.get("/block/0").await;
    let by_height: BlockRes = response.json();
    assert_eq!(by_height.hash, hash);

    let response = server.get("/block/42").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_peer_handshake_registers_peer() {
    let dir = TempDir::new().unwrap();
    let (node, _) = funded_node(&dir);
    let miner = KeyPair::generate().account();
    let server = TestServer::new(build_router(Arc::clone(&node))).unwrap();

    let response = server
        .get("/node/peer")
        .add_query_param("ip", "10.1.2.3")
        .add_query_param("port", "9000")
        .add_query_param("miner", miner.to_string())
        .add_query_param("version", "test")
        .await;
    assert_eq!(response.status_code(), 200);

    let peers = node.known_peers().await;
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].tcp_address(), "10.1.2.3:9000");
    assert_eq!(peers[0].account, miner);
}

#[tokio::test]
async fn test_bootstrap_peer_seeded_from_config() {
    let dir = TempDir::new().unwrap();
    let funded = wallet::new_account(dir.path()).unwrap();
    ledger::init_data_dir(dir.path(), &Genesis::default_devnet(funded)).unwrap();

    let mut config = test_config(&dir, Some(funded));
    config.bootstrap = Some(BootstrapConfig {
        ip: "10.0.0.9".to_string(),
        port: 8080,
        account: None,
    });
    let node = Node::new(&config, "test").unwrap();

    let peers = node.known_peers().await;
    assert_eq!(peers.len(), 1);
    assert!(peers[0].is_bootstrap);
    assert_eq!(peers[0].tcp_address(), "10.0.0.9:8080");
}
