//! HTTP JSON API
//!
//! Serves the wallet-facing endpoints (balances, transaction submission,
//! block lookup) and the peer protocol (status, block sync, handshake).
//! The sync loop speaks these same wire types from the client side.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::block::{Block, Hash};
use crate::crypto::Account;
use crate::error::{ChainError, Result};
use crate::ledger;
use crate::node::{Node, PeerNode};
use crate::transaction::{SignedTx, Tx};
use crate::wallet;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalancesRes {
    pub block_hash: Hash,
    pub balances: HashMap<Account, u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxAddReq {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxAddRes {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusRes {
    pub block_hash: Hash,
    pub block_number: u64,
    pub peers_known: HashMap<String, PeerNode>,
    pub pending_txs: Vec<SignedTx>,
    pub node_version: String,
    pub account: Account,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncRes {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPeerRes {
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NextNonceRes {
    pub account: Account,
    pub nonce: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockRes {
    pub hash: Hash,
    pub block: Block,
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(rename = "fromBlock")]
    pub from_block: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPeerQuery {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub miner: String,
    #[serde(default)]
    pub version: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    ChainError(ChainError),
    InvalidInput(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::ChainError(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::ChainError(err)
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_balances(State(node): State<Arc<Node>>) -> Json<BalancesRes> {
    let state = node.state().read().await;

    Json(BalancesRes {
        block_hash: state.latest_block_hash(),
        balances: state.balances().clone(),
    })
}

/// Signs the request with the sender's keystore key and queues it. The nonce
/// is stamped from the pending ledger so wallets can submit back to back.
async fn add_tx(
    State(node): State<Arc<Node>>,
    Json(req): Json<TxAddReq>,
) -> std::result::Result<Json<TxAddRes>, ApiError> {
    if req.from.is_empty() {
        return Err(ApiError::InvalidInput(
            "from account must not be empty".to_string(),
        ));
    }

    let keypair = wallet::load_keypair(node.data_dir(), &req.from)?;
    let nonce = node.next_account_nonce(&req.from).await;
    let tx = Tx::new(req.from, req.to, req.value, nonce, &req.data);
    let signed = SignedTx::sign(tx, &keypair)?;

    node.add_pending_tx(signed, "local").await?;

    Ok(Json(TxAddRes { success: true }))
}

async fn node_status(State(node): State<Arc<Node>>) -> Json<StatusRes> {
    let (block_hash, block_number) = {
        let state = node.state().read().await;
        (state.latest_block_hash(), state.latest_block_number())
    };
    let pending_txs = node.pending_txs().await;
    let peers_known = node
        .known_peers()
        .await
        .into_iter()
        .map(|p| (p.tcp_address(), p))
        .collect();

    Json(StatusRes {
        block_hash,
        block_number,
        peers_known,
        pending_txs,
        node_version: node.version().to_string(),
        account: node.info().account,
    })
}

/// Serves blocks after the requested hash straight from the block log, so
/// a large sync never holds the ledger lock.
async fn sync_blocks(
    State(node): State<Arc<Node>>,
    Query(query): Query<SyncQuery>,
) -> std::result::Result<Json<SyncRes>, ApiError> {
    let from_block = Hash::from_hex(&query.from_block)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid fromBlock: {}", e)))?;

    let blocks = ledger::get_blocks_after(node.data_dir(), &from_block)?;
    Ok(Json(SyncRes { blocks }))
}

async fn add_peer(
    State(node): State<Arc<Node>>,
    Query(query): Query<AddPeerQuery>,
) -> Json<AddPeerRes> {
    let account = query.miner.parse().unwrap_or_default();
    let peer = PeerNode::new(query.ip, query.port, false, account, query.version);
    node.add_peer(peer).await;

    Json(AddPeerRes {
        success: true,
        error: String::new(),
    })
}

/// Looks a block up by hex hash or decimal height.
async fn get_block(
    State(node): State<Arc<Node>>,
    AxumPath(id): AxumPath<String>,
) -> std::result::Result<Json<BlockRes>, ApiError> {
    let found = if let Ok(height) = id.parse::<u64>() {
        ledger::get_block_by_height(node.data_dir(), height)
    } else {
        let hash = Hash::from_hex(&id)
            .map_err(|_| ApiError::InvalidInput(format!("Not a block height or hash: {}", id)))?;
        ledger::get_block_by_hash(node.data_dir(), &hash)
    };

    match found {
        Ok((hash, block)) => Ok(Json(BlockRes { hash, block })),
        Err(_) => Err(ApiError::NotFound(format!("No such block: {}", id))),
    }
}

async fn next_nonce(
    State(node): State<Arc<Node>>,
    AxumPath(account): AxumPath<String>,
) -> std::result::Result<Json<NextNonceRes>, ApiError> {
    let account: Account = account
        .parse()
        .map_err(|e: ChainError| ApiError::InvalidInput(e.to_string()))?;
    let nonce = node.next_account_nonce(&account).await;

    Ok(Json(NextNonceRes { account, nonce }))
}

// ============================================================================
// Router and server
// ============================================================================

pub fn build_router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/balances/list", get(list_balances))
        .route("/tx/add", post(add_tx))
        .route("/node/status", get(node_status))
        .route("/node/sync", get(sync_blocks))
        .route("/node/peer", get(add_peer))
        .route("/block/:id", get(get_block))
        .route("/nonce/:account", get(next_nonce))
        .layer(CorsLayer::permissive())
        .with_state(node)
}

pub async fn serve(node: Arc<Node>) -> Result<()> {
    let addr = node.info().tcp_address();
    let mut shutdown = node.shutdown_signal();
    let router = build_router(Arc::clone(&node));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ChainError::Network(format!("Failed to bind {}: {}", addr, e)))?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("Shutting down HTTP API");
        })
        .await
        .map_err(|e| ChainError::Network(format!("HTTP server error: {}", e)))?;

    Ok(())
}
