//! Proof-of-work search
//!
//! Candidate header nonces are drawn at random rather than counted up, so
//! competing miners do not walk the same sequence. The search runs on a
//! blocking thread and polls a shared cancel flag so a freshly synced block
//! can abort a now-stale attempt.

use crate::block::{is_block_hash_valid, Block, Hash};
use crate::crypto::Account;
use crate::error::{ChainError, Result};
use crate::transaction::SignedTx;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

const PROGRESS_LOG_INTERVAL: u64 = 1_000_000;

/// Everything about the next block except the winning nonce. The timestamp
/// is fixed at construction so every candidate hashes the same content.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub parent: Hash,
    pub number: u64,
    pub time: u64,
    pub miner: Account,
    pub txs: Vec<SignedTx>,
}

impl PendingBlock {
    pub fn new(parent: Hash, number: u64, miner: Account, txs: Vec<SignedTx>) -> Self {
        PendingBlock {
            parent,
            number,
            time: chrono::Utc::now().timestamp() as u64,
            miner,
            txs,
        }
    }
}

/// Searches random nonces until the block hash meets `difficulty` or the
/// cancel flag is raised.
pub fn mine(pending: PendingBlock, difficulty: usize, cancel: &AtomicBool) -> Result<Block> {
    if pending.txs.is_empty() {
        return Err(ChainError::InvalidBlock(
            "Refusing to mine a block with no transactions".to_string(),
        ));
    }

    let started = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            info!(number = pending.number, attempts, "Mining cancelled");
            return Err(ChainError::MiningCancelled);
        }

        attempts += 1;
        if attempts % PROGRESS_LOG_INTERVAL == 0 {
            debug!(number = pending.number, attempts, "Still mining");
        }

        let nonce: u32 = rand::random();
        let block = Block::new(
            pending.parent,
            pending.number,
            nonce,
            pending.time,
            pending.miner,
            pending.txs.clone(),
        );

        let hash = block.hash();
        if is_block_hash_valid(&hash, difficulty) {
            info!(
                number = pending.number,
                %hash,
                nonce,
                attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Mined block"
            );
            return Ok(block);
        }
    }
}
