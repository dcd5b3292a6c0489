//! Error types for Emberchain

use std::fmt;

#[derive(Debug, Clone)]
pub enum ChainError {
    Io(String),
    Decode(String),
    InvalidBlock(String),
    InvalidTx(String),
    InsufficientBalance(String),
    BadNonce(String),
    Authenticity(String),
    CryptoError(String),
    Network(String),
    MiningCancelled,
    Config(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::Io(msg) => write!(f, "IO error: {}", msg),
            ChainError::Decode(msg) => write!(f, "Decode error: {}", msg),
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            ChainError::InvalidTx(msg) => write!(f, "Invalid transaction: {}", msg),
            ChainError::InsufficientBalance(msg) => write!(f, "Insufficient balance: {}", msg),
            ChainError::BadNonce(msg) => write!(f, "Bad nonce: {}", msg),
            ChainError::Authenticity(msg) => write!(f, "Authenticity error: {}", msg),
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::Network(msg) => write!(f, "Network error: {}", msg),
            ChainError::MiningCancelled => write!(f, "Mining cancelled"),
            ChainError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Network(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
