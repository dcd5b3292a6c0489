//! The account ledger: balances, nonces, and the append-only block log
//!
//! `State` is the committed view of the chain. It is rebuilt
//! deterministically by loading the genesis balance map and replaying every
//! record of the block log in file order. Applying a block is all-or-nothing:
//! validation and transaction application run on a scratch copy, the record
//! is appended and flushed to the log, and only then does the in-memory
//! state advance. A crash between the write and the pointer update is
//! recovered by the next replay.

use crate::block::{is_block_hash_valid, Block, BlockFs, Hash, BLOCK_REWARD};
use crate::crypto::Account;
use crate::error::{ChainError, Result};
use crate::genesis::{self, Genesis};
use crate::transaction::SignedTx;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const BLOCKS_DB_FILE: &str = "block.db";

pub fn blocks_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(BLOCKS_DB_FILE)
}

/// Creates the data dir, writes the genesis file (if absent) and an empty
/// block log, so a fresh node can boot.
pub fn init_data_dir(data_dir: &Path, genesis: &Genesis) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| ChainError::Io(format!("Failed to create data dir {:?}: {}", data_dir, e)))?;

    let genesis_path = genesis::genesis_path(data_dir);
    if !genesis_path.exists() {
        genesis.write(&genesis_path)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(blocks_db_path(data_dir))
        .map_err(|e| ChainError::Io(format!("Failed to create block log: {}", e)))?;

    Ok(())
}

#[derive(Debug, Clone)]
pub struct State {
    balances: HashMap<Account, u64>,
    nonces: HashMap<Account, u64>,
    latest_block_hash: Hash,
    latest_block_number: u64,
    has_genesis: bool,
    mining_difficulty: usize,
    db_path: PathBuf,
}

impl State {
    /// Loads the genesis balances then replays the whole block log. Any
    /// malformed record or failed application is fatal: a corrupt log cannot
    /// be recovered locally.
    pub fn new_from_disk(data_dir: &Path, mining_difficulty: usize) -> Result<State> {
        let gen = Genesis::load(&genesis::genesis_path(data_dir))?;

        let db_path = blocks_db_path(data_dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&db_path)
            .map_err(|e| ChainError::Io(format!("Failed to open block log {:?}: {}", db_path, e)))?;

        let mut state = State {
            balances: gen.balances,
            nonces: HashMap::new(),
            latest_block_hash: Hash::empty(),
            latest_block_number: 0,
            has_genesis: false,
            mining_difficulty,
            db_path,
        };

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: BlockFs = serde_json::from_str(&line).map_err(|e| {
                ChainError::Decode(format!("Malformed block record at line {}: {}", line_no + 1, e))
            })?;

            let applied = state.apply_block(&record.value)?;
            if applied != record.key {
                return Err(ChainError::Decode(format!(
                    "Block record at line {} hashes to {} but claims {}",
                    line_no + 1,
                    applied,
                    record.key
                )));
            }
        }

        Ok(state)
    }

    pub fn balance(&self, account: &Account) -> u64 {
        *self.balances.get(account).unwrap_or(&0)
    }

    pub fn balances(&self) -> &HashMap<Account, u64> {
        &self.balances
    }

    /// The nonce the next transaction from `account` must carry.
    pub fn next_account_nonce(&self, account: &Account) -> u64 {
        self.nonces.get(account).unwrap_or(&0) + 1
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.latest_block_hash
    }

    pub fn latest_block_number(&self) -> u64 {
        self.latest_block_number
    }

    pub fn has_genesis(&self) -> bool {
        self.has_genesis
    }

    pub fn next_block_number(&self) -> u64 {
        if !self.has_genesis {
            return 0;
        }
        self.latest_block_number + 1
    }

    pub fn mining_difficulty(&self) -> usize {
        self.mining_difficulty
    }

    /// Deep clone for speculative mutation (pending ledger, scratch apply).
    /// The copy shares no mutable storage with the original.
    pub fn copy(&self) -> State {
        self.clone()
    }

    /// Validates and applies `block`, persisting it to the log. The block
    /// is applied on a scratch copy; the log record is appended and flushed
    /// before the in-memory state advances.
    pub fn add_block(&mut self, block: Block) -> Result<Hash> {
        let mut scratch = self.copy();
        let hash = scratch.apply_block(&block)?;

        self.persist(&BlockFs {
            key: hash,
            value: block,
        })?;

        *self = scratch;
        Ok(hash)
    }

    /// Validation ladder plus in-memory application. Used directly by log
    /// replay; `add_block` wraps it with scratch-copy atomicity and
    /// persistence.
    fn apply_block(&mut self, block: &Block) -> Result<Hash> {
        let expected_number = self.next_block_number();
        if block.header.number != expected_number {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid block number. Expected {}, got {}",
                expected_number, block.header.number
            )));
        }

        if self.has_genesis && block.header.parent != self.latest_block_hash {
            return Err(ChainError::InvalidBlock(format!(
                "Invalid parent hash. Expected {}, got {}",
                self.latest_block_hash, block.header.parent
            )));
        }

        let hash = block.hash();
        if !is_block_hash_valid(&hash, self.mining_difficulty) {
            return Err(ChainError::InvalidBlock(format!(
                "Block hash {} does not meet difficulty {}",
                hash, self.mining_difficulty
            )));
        }

        for tx in &block.txs {
            self.apply_tx(tx)?;
        }

        let rewarded = self
            .balance(&block.header.miner)
            .checked_add(BLOCK_REWARD)
            .ok_or_else(|| {
                ChainError::InvalidBlock(format!(
                    "Block reward overflows balance of miner {}",
                    block.header.miner
                ))
            })?;
        self.balances.insert(block.header.miner, rewarded);

        self.latest_block_hash = hash;
        self.latest_block_number = block.header.number;
        self.has_genesis = true;

        Ok(hash)
    }

    /// Applies a single transaction. Reward transactions are credit-only;
    /// everything else must carry the sender's next nonce and be covered by
    /// the sender's balance. A failed transaction mutates nothing, so every
    /// check runs before the first balance write. Credits are checked
    /// arithmetic: an overflowing value is a rejected transaction, never a
    /// panic, even inside a PoW-valid block from a peer.
    pub fn apply_tx(&mut self, tx: &SignedTx) -> Result<()> {
        if tx.tx.is_reward() {
            let credited = self.balance(&tx.tx.to).checked_add(tx.tx.value).ok_or_else(|| {
                ChainError::InvalidTx(format!("Reward overflows balance of {}", tx.tx.to))
            })?;
            self.balances.insert(tx.tx.to, credited);
            return Ok(());
        }

        let expected_nonce = self.next_account_nonce(&tx.tx.from);
        if tx.tx.nonce != expected_nonce {
            return Err(ChainError::BadNonce(format!(
                "TX from {} has nonce {}, expected {}",
                tx.tx.from, tx.tx.nonce, expected_nonce
            )));
        }

        let sender_balance = self.balance(&tx.tx.from);
        if sender_balance < tx.tx.value {
            return Err(ChainError::InsufficientBalance(format!(
                "{} has {} but TX needs {}",
                tx.tx.from, sender_balance, tx.tx.value
            )));
        }

        let recipient_balance = if tx.tx.to == tx.tx.from {
            sender_balance - tx.tx.value
        } else {
            self.balance(&tx.tx.to)
        };
        let credited = recipient_balance.checked_add(tx.tx.value).ok_or_else(|| {
            ChainError::InvalidTx(format!("TX value overflows balance of {}", tx.tx.to))
        })?;

        self.balances.insert(tx.tx.from, sender_balance - tx.tx.value);
        self.balances.insert(tx.tx.to, credited);
        self.nonces.insert(tx.tx.from, tx.tx.nonce);

        Ok(())
    }

    /// Appends the record as one JSON line and makes it durable before the
    /// caller advances the chain pointer.
    fn persist(&self, record: &BlockFs) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.db_path)
            .map_err(|e| {
                ChainError::Io(format!("Failed to open block log {:?}: {}", self.db_path, e))
            })?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_all()?;

        Ok(())
    }
}

fn scan_log<F>(data_dir: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(BlockFs) -> bool,
{
    let file = File::open(blocks_db_path(data_dir))
        .map_err(|e| ChainError::Io(format!("Failed to open block log: {}", e)))?;

    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: BlockFs = serde_json::from_str(&line)?;
        if !visit(record) {
            break;
        }
    }

    Ok(())
}

/// All blocks strictly after `from_hash` in chain order. The empty hash
/// means "everything from genesis".
pub fn get_blocks_after(data_dir: &Path, from_hash: &Hash) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut collecting = from_hash.is_empty();

    scan_log(data_dir, |record| {
        if collecting {
            blocks.push(record.value);
        } else if record.key == *from_hash {
            collecting = true;
        }
        true
    })?;

    Ok(blocks)
}

pub fn get_block_by_hash(data_dir: &Path, hash: &Hash) -> Result<(Hash, Block)> {
    let mut found = None;

    scan_log(data_dir, |record| {
        if record.key == *hash {
            found = Some((record.key, record.value));
            return false;
        }
        true
    })?;

    found.ok_or_else(|| ChainError::InvalidBlock(format!("No block with hash {}", hash)))
}

pub fn get_block_by_height(data_dir: &Path, height: u64) -> Result<(Hash, Block)> {
    let mut found = None;

    scan_log(data_dir, |record| {
        if record.value.header.number == height {
            found = Some((record.key, record.value));
            return false;
        }
        true
    })?;

    found.ok_or_else(|| ChainError::InvalidBlock(format!("No block at height {}", height)))
}
