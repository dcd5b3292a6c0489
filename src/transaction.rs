//! Transaction types for Emberchain

use crate::block::Hash;
use crate::crypto::{self, Account, KeyPair, SIGNATURE_SIZE};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The `data` marker for a no-cost issuance transaction: value is credited
/// to `to` without debiting `from` or consuming a nonce.
pub const REWARD_DATA: &str = "reward";

/// An unsigned value transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    pub nonce: u64,
    pub data: String,
    pub time: u64,
}

impl Tx {
    /// Creates a transaction stamped with the current Unix time.
    pub fn new(from: Account, to: Account, value: u64, nonce: u64, data: &str) -> Self {
        Tx {
            from,
            to,
            value,
            nonce,
            data: data.to_string(),
            time: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn is_reward(&self) -> bool {
        self.data == REWARD_DATA
    }

    /// Canonical encoding: a fixed field-by-field binary layout. Content
    /// hashes are computed over these bytes, never over JSON, so the hash
    /// cannot drift with serializer field order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(96 + self.data.len());
        bytes.extend_from_slice(self.from.as_bytes());
        bytes.extend_from_slice(self.to.as_bytes());
        bytes.extend_from_slice(&self.value.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&(self.data.len() as u64).to_le_bytes());
        bytes.extend_from_slice(self.data.as_bytes());
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes
    }

    /// Content hash of the unsigned transaction; this is the digest that
    /// gets signed.
    pub fn hash(&self) -> Hash {
        Hash::new(Sha256::digest(self.canonical_bytes()).into())
    }
}

/// A transaction plus its recoverable signature. Immutable once signed and
/// content-addressed by [`SignedTx::hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    #[serde(flatten)]
    pub tx: Tx,
    #[serde(with = "hex_signature")]
    pub signature: Vec<u8>,
}

impl SignedTx {
    pub fn new(tx: Tx, signature: Vec<u8>) -> Self {
        SignedTx { tx, signature }
    }

    /// Signs the transaction's content hash with the given key pair.
    pub fn sign(tx: Tx, keypair: &KeyPair) -> Result<Self, ChainError> {
        let signature = keypair.sign(tx.hash().as_bytes())?;
        Ok(SignedTx {
            tx,
            signature: signature.to_vec(),
        })
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = self.tx.canonical_bytes();
        bytes.extend_from_slice(&self.signature);
        bytes
    }

    /// Content address of the signed transaction: signature included, so the
    /// mempool keys exact signed bytes.
    pub fn hash(&self) -> Hash {
        Hash::new(Sha256::digest(self.canonical_bytes()).into())
    }

    /// Recover-and-compare authenticity check: the account recovered from
    /// the signature over the unsigned tx hash must equal `from`.
    pub fn is_authentic(&self) -> Result<bool, ChainError> {
        if self.signature.len() != SIGNATURE_SIZE {
            return Ok(false);
        }

        let recovered = crypto::recover_account(self.tx.hash().as_bytes(), &self.signature)?;
        Ok(recovered == self.tx.from)
    }
}

mod hex_signature {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sig: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(sig))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
