//! Genesis file handling
//!
//! A genesis file is a JSON object with a `balances` map seeding the ledger
//! before any block is replayed. Extra keys (chain id, symbol, …) are
//! tolerated and ignored.

use crate::crypto::Account;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const GENESIS_FILE: &str = "genesis.json";

/// Balance seeded to the funded account by [`Genesis::default_devnet`].
pub const DEFAULT_GENESIS_BALANCE: u64 = 1_000_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    pub balances: HashMap<Account, u64>,
}

impl Genesis {
    /// A single-account devnet genesis funding `faucet`.
    pub fn default_devnet(faucet: Account) -> Self {
        let mut balances = HashMap::new();
        balances.insert(faucet, DEFAULT_GENESIS_BALANCE);
        Genesis { balances }
    }

    pub fn load(path: &Path) -> Result<Genesis> {
        let content = fs::read_to_string(path).map_err(|e| {
            ChainError::Io(format!("Failed to read genesis file {:?}: {}", path, e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| ChainError::Decode(format!("Malformed genesis file {:?}: {}", path, e)))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| ChainError::Io(format!("Failed to write genesis file {:?}: {}", path, e)))
    }
}

pub fn genesis_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join(GENESIS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use tempfile::TempDir;

    #[test]
    fn test_genesis_round_trip() {
        let dir = TempDir::new().unwrap();
        let faucet = KeyPair::generate().account();

        let genesis = Genesis::default_devnet(faucet);
        let path = genesis_path(dir.path());
        genesis.write(&path).unwrap();

        let loaded = Genesis::load(&path).unwrap();
        assert_eq!(loaded.balances.get(&faucet), Some(&DEFAULT_GENESIS_BALANCE));
    }

    #[test]
    fn test_extra_keys_tolerated() {
        let dir = TempDir::new().unwrap();
        let faucet = KeyPair::generate().account();
        let path = genesis_path(dir.path());

        let content = format!(
            r#"{{"genesis_time": "2020-06-01T00:00:00Z", "symbol": "EMB", "balances": {{"{}": 42}}}}"#,
            faucet.to_hex()
        );
        std::fs::write(&path, content).unwrap();

        let loaded = Genesis::load(&path).unwrap();
        assert_eq!(loaded.balances.get(&faucet), Some(&42));
    }

    #[test]
    fn test_missing_genesis_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = Genesis::load(&genesis_path(dir.path())).unwrap_err();
        assert!(matches!(err, ChainError::Io(_)));
    }
}
