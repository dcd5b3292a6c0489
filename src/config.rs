//! Configuration management for Emberchain

use crate::crypto::Account;
use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
}

/// The peer a fresh node first syncs from.
#[derive(Debug, Deserialize)]
pub struct BootstrapConfig {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub account: Option<Account>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ip: default_ip(),
            port: default_port(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            account: None,
            difficulty: default_difficulty(),
            enabled: default_mining_enabled(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_difficulty() -> usize {
    3
}

fn default_mining_enabled() -> bool {
    false
}

pub fn load_config(path: &Path) -> Result<Config> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        // Sane defaults when the config file is absent
        Config {
            node: NodeConfig::default(),
            miner: MinerConfig::default(),
            bootstrap: None,
        }
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::Config(format!("Failed to parse {:?}: {}", path, e)))?
    };

    if config.node.data_dir.is_empty() {
        return Err(ChainError::Config(
            "node.data_dir must not be empty".to_string(),
        ));
    }

    if config.miner.enabled && config.miner.account.is_none() {
        return Err(ChainError::Config(
            "miner.account must be set when mining is enabled".to_string(),
        ));
    }

    Ok(config)
}
