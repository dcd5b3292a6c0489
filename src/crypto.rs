//! Cryptographic primitives for Emberchain
//!
//! Accounts are 32-byte SHA-256 digests of a compressed secp256k1 public
//! key. Transactions are signed with recoverable ECDSA so that verification
//! is recover-and-compare: the signer's account is recovered from the
//! signature and checked against the claimed sender.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A thread-safe, lazily initialized Secp256k1 context.
/// This prevents repeated, unnecessary context creation.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Recoverable signature size: 64 compact bytes plus one recovery id byte.
pub const SIGNATURE_SIZE: usize = 65;

pub const ACCOUNT_SIZE: usize = 32;

/// Ledger identity: the SHA-256 hash of a compressed public key.
/// Serializes as a hex string so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Account([u8; ACCOUNT_SIZE]);

impl Account {
    pub fn new(bytes: [u8; ACCOUNT_SIZE]) -> Self {
        Account(bytes)
    }

    /// Derives an account from a compressed secp256k1 public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let pubkey_bytes: [u8; PUBLIC_KEY_SIZE] = public_key.serialize();
        Account(Sha256::digest(pubkey_bytes).into())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::CryptoError(format!("Invalid hex account: {}", e)))?;
        if bytes.len() != ACCOUNT_SIZE {
            return Err(ChainError::CryptoError(format!(
                "Account must be {} bytes, got {}",
                ACCOUNT_SIZE,
                bytes.len()
            )));
        }
        let mut out = [0u8; ACCOUNT_SIZE];
        out.copy_from_slice(&bytes);
        Ok(Account(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; ACCOUNT_SIZE] {
        &self.0
    }

    /// The all-zero account, used as a placeholder miner/beneficiary.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ACCOUNT_SIZE]
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Account {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Account::from_hex(s)
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Account::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);

        Ok(KeyPair {
            secret_key,
            public_key,
        })
    }

    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.secret_key.secret_bytes()
    }

    /// The account controlled by this key pair.
    pub fn account(&self) -> Account {
        Account::from_public_key(&self.public_key)
    }

    /// Signs a 32-byte message digest, returning a recoverable signature.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE], ChainError> {
        let message = Message::from_digest_slice(digest)
            .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut out = [0u8; SIGNATURE_SIZE];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8;
        Ok(out)
    }
}

/// Recovers the signer's account from a 32-byte digest and a recoverable
/// signature produced by [`KeyPair::sign`].
pub fn recover_account(digest: &[u8; 32], signature: &[u8]) -> Result<Account, ChainError> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes, got {}",
            SIGNATURE_SIZE,
            signature.len()
        )));
    }

    let message = Message::from_digest_slice(digest)
        .map_err(|e| ChainError::CryptoError(format!("Failed to create message: {}", e)))?;

    let recovery_id = RecoveryId::from_i32(signature[64] as i32)
        .map_err(|e| ChainError::CryptoError(format!("Invalid recovery id: {}", e)))?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    let public_key = SECP256K1_CONTEXT
        .recover_ecdsa(&message, &recoverable)
        .map_err(|_| ChainError::CryptoError("Signature recovery failed".to_string()))?;

    Ok(Account::from_public_key(&public_key))
}
