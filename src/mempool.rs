//! Pending transaction pool with speculative pre-validation
//!
//! Every admitted transaction is applied to a private pending ledger (a
//! copy of the committed state plus all earlier pending transactions), so
//! admission catches bad nonces, replays, and overdrafts before anything
//! reaches a block. When a block lands, the pending ledger is rebuilt from
//! the new committed state and the surviving transactions re-applied.

use crate::block::{Block, Hash};
use crate::error::{ChainError, Result};
use crate::ledger::State;
use crate::transaction::SignedTx;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// How many mined transaction hashes to remember for duplicate suppression.
const ARCHIVED_TX_CAP: usize = 4096;

pub struct Mempool {
    pending: HashMap<Hash, SignedTx>,
    archived: LruCache<Hash, SignedTx>,
    pending_state: State,
}

impl Mempool {
    pub fn new(committed: &State) -> Self {
        Mempool {
            pending: HashMap::new(),
            archived: LruCache::new(NonZeroUsize::new(ARCHIVED_TX_CAP).unwrap()),
            pending_state: committed.copy(),
        }
    }

    /// Admits a transaction: authenticity check, then application against
    /// the pending ledger. Returns `Ok(false)` for a transaction already
    /// mined, `Ok(true)` for a newly queued one. A replay of a pending
    /// transaction fails with `BadNonce`. `from_peer` records where the
    /// transaction came from.
    pub fn admit(&mut self, tx: SignedTx, from_peer: &str) -> Result<bool> {
        if !tx.is_authentic()? {
            return Err(ChainError::Authenticity(format!(
                "Signature does not match sender {}",
                tx.tx.from
            )));
        }

        if tx.tx.is_reward() {
            return Err(ChainError::InvalidTx(
                "Reward transactions are minted in blocks, not submitted".to_string(),
            ));
        }

        let hash = tx.hash();
        if self.archived.contains(&hash) {
            return Ok(false);
        }

        // A tx already pending fails here with BadNonce: the pending ledger
        // has consumed its nonce, so replays are rejected loudly.
        self.pending_state.apply_tx(&tx)?;

        debug!(
            tx = %hash,
            from = %tx.tx.from,
            to = %tx.tx.to,
            value = tx.tx.value,
            from_peer,
            "Queued pending TX"
        );
        self.pending.insert(hash, tx);

        Ok(true)
    }

    /// Drops the block's transactions from the pool and rebuilds the
    /// pending ledger on top of the new committed state. Pending
    /// transactions that no longer apply (spent nonce, drained balance)
    /// are discarded.
    pub fn remove_mined(&mut self, block: &Block, committed: &State) {
        for tx in &block.txs {
            let hash = tx.hash();
            if let Some(mined) = self.pending.remove(&hash) {
                self.archived.put(hash, mined);
            }
        }

        self.pending_state = committed.copy();

        let mut remaining: Vec<(Hash, SignedTx)> = self.pending.drain().collect();
        remaining.sort_by(|(ha, a), (hb, b)| {
            (a.tx.time, a.tx.nonce, *ha).cmp(&(b.tx.time, b.tx.nonce, *hb))
        });

        for (hash, tx) in remaining {
            match self.pending_state.apply_tx(&tx) {
                Ok(()) => {
                    self.pending.insert(hash, tx);
                }
                Err(err) => {
                    warn!(tx = %hash, %err, "Dropping pending TX invalidated by new block");
                }
            }
        }
    }

    pub fn pending_txs(&self) -> Vec<SignedTx> {
        self.pending.values().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Next nonce for `account` as seen by the pending ledger, so a wallet
    /// can chain transactions without waiting for a block.
    pub fn next_account_nonce(&self, account: &crate::crypto::Account) -> u64 {
        self.pending_state.next_account_nonce(account)
    }
}
