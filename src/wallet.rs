//! Flat-file keystore
//!
//! Each account's secret key lives in `<data_dir>/keystore/<account>.key`
//! as plain hex. Good enough for a devnet; anything touching real value
//! needs an encrypted store instead.

use crate::crypto::{Account, KeyPair};
use crate::error::{ChainError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const KEYSTORE_DIR: &str = "keystore";

pub fn keystore_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(KEYSTORE_DIR)
}

fn key_path(data_dir: &Path, account: &Account) -> PathBuf {
    keystore_dir(data_dir).join(format!("{}.key", account))
}

/// Generates a keypair and stores its secret under the keystore dir.
pub fn new_account(data_dir: &Path) -> Result<Account> {
    let keypair = KeyPair::generate();
    let account = keypair.account();

    let dir = keystore_dir(data_dir);
    fs::create_dir_all(&dir)
        .map_err(|e| ChainError::Io(format!("Failed to create keystore dir {:?}: {}", dir, e)))?;

    let path = key_path(data_dir, &account);
    fs::write(&path, hex::encode(keypair.secret_bytes()))
        .map_err(|e| ChainError::Io(format!("Failed to write key file {:?}: {}", path, e)))?;

    Ok(account)
}

pub fn load_keypair(data_dir: &Path, account: &Account) -> Result<KeyPair> {
    let path = key_path(data_dir, account);
    let hex_str = fs::read_to_string(&path)
        .map_err(|_| ChainError::CryptoError(format!("No key in keystore for {}", account)))?;

    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| ChainError::CryptoError(format!("Corrupt key file {:?}: {}", path, e)))?;

    let keypair = KeyPair::from_secret_bytes(&bytes)?;
    if keypair.account() != *account {
        return Err(ChainError::CryptoError(format!(
            "Key file {:?} does not belong to {}",
            path, account
        )));
    }

    Ok(keypair)
}

pub fn list_accounts(data_dir: &Path) -> Result<Vec<Account>> {
    let dir = keystore_dir(data_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut accounts = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some(hex_part) = name.strip_suffix(".key") {
            if let Ok(account) = hex_part.parse() {
                accounts.push(account);
            }
        }
    }
    accounts.sort();

    Ok(accounts)
}
