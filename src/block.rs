//! Block structures, content hashing, and the proof-of-work predicate

use crate::crypto::Account;
use crate::error::ChainError;
use crate::transaction::SignedTx;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

pub const HASH_SIZE: usize = 32;

/// Fixed issuance credited to the block's miner on application.
pub const BLOCK_REWARD: u64 = 100;

/// A 32-byte SHA-256 digest. Serializes as a hex string on the wire and in
/// the block log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// The zero hash: "no parent yet". A genesis block links to this.
    pub fn empty() -> Self {
        Hash([0u8; HASH_SIZE])
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ChainError> {
        if hex_str.is_empty() {
            return Ok(Hash::empty());
        }
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::Decode(format!("Invalid hex hash: {}", e)))?;
        if bytes.len() != HASH_SIZE {
            return Err(ChainError::Decode(format!(
                "Hash must be {} bytes, got {}",
                HASH_SIZE,
                bytes.len()
            )));
        }
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&bytes);
        Ok(Hash(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: Hash,
    pub number: u64,
    pub nonce: u32,
    pub time: u64,
    pub miner: Account,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(rename = "payload")]
    pub txs: Vec<SignedTx>,
}

impl Block {
    pub fn new(
        parent: Hash,
        number: u64,
        nonce: u32,
        time: u64,
        miner: Account,
        txs: Vec<SignedTx>,
    ) -> Self {
        Block {
            header: BlockHeader {
                parent,
                number,
                nonce,
                time,
                miner,
            },
            txs,
        }
    }

    /// Content hash over the canonical binary layout of the whole block:
    /// header fields in declaration order, then every signed transaction.
    /// Transaction order is part of the hash.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.header.parent.as_bytes());
        hasher.update(self.header.number.to_le_bytes());
        hasher.update(self.header.nonce.to_le_bytes());
        hasher.update(self.header.time.to_le_bytes());
        hasher.update(self.header.miner.as_bytes());
        hasher.update((self.txs.len() as u64).to_le_bytes());
        for tx in &self.txs {
            hasher.update(tx.canonical_bytes());
        }
        Hash(hasher.finalize().into())
    }
}

/// One record of the append-only block log: `{"hash": …, "block": …}`,
/// serialized as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockFs {
    #[serde(rename = "hash")]
    pub key: Hash,
    #[serde(rename = "block")]
    pub value: Block,
}

/// The proof-of-work validity predicate. A hash is valid when its first
/// `difficulty` bytes are zero AND byte `difficulty` is non-zero: the
/// boundary is exact, a hash with more leading zeros than required is
/// invalid.
pub fn is_block_hash_valid(hash: &Hash, difficulty: usize) -> bool {
    if difficulty >= HASH_SIZE {
        return false;
    }

    hash.0[..difficulty].iter().all(|b| *b == 0) && hash.0[difficulty] != 0
}
