//! Emberchain - A minimal account-based proof-of-work blockchain node
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`ledger`] - Account balances, nonces, and the append-only block log
//! - [`block`] - Block structure and proof-of-work validation
//! - [`transaction`] - Signed transaction types
//! - [`genesis`] - Genesis balance bootstrap
//! - [`mempool`] - Pending transaction pool with speculative validation
//!
//! ## Consensus
//! - [`miner`] - Cancellable proof-of-work search
//!
//! ## Cryptography
//! - [`crypto`] - secp256k1 accounts and recoverable signatures
//! - [`wallet`] - Flat-file keystore
//!
//! ## Networking
//! - [`node`] - Node orchestration and peer bookkeeping
//! - [`sync`] - Periodic peer synchronization
//! - [`api`] - HTTP JSON API (wallet endpoints and peer protocol)
//!
//! ## Configuration & Utilities
//! - [`config`] - TOML configuration
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod block;
pub mod genesis;
pub mod ledger;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod wallet;

// ============================================================================
// Networking
// ============================================================================
pub mod api;
pub mod node;
pub mod sync;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
