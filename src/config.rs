//! Configuration Module
//!
//! This module defines all configuration structures for the relayer.
//! Configuration is loaded from TOML files and parsed using serde.

use crate::chain::RetryPolicy;
use ethers::types::Address;
use serde::Deserialize;
use std::fs;

/// Main configuration structure
///
/// Contains all configuration sections for the relayer.
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [l1]
/// rpc_url = "ws://127.0.0.1:8546"
/// chain_id = 31337
///
/// [l2]
/// rpc_url = "http://127.0.0.1:4011"
/// chain_id = 53077
///
/// [contracts]
/// l1_portal = "0x..."
/// l2_portal = "0x..."
/// l1_bridge = "0x..."
/// l2_bridge = "0x..."
///
/// [tracker]
/// sequencer_inbox = "0x..."
/// rollup = "0x..."
/// start_block = 0
///
/// [api]
/// host = "127.0.0.1"
/// port = 8645
///
/// [database]
/// url = "sqlite://relayer.db"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub l1: ChainConfig,
    pub l2: ChainConfig,
    pub contracts: ContractsConfig,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    /// Environment variable holding the hex private key used on both chains
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

/// Connection settings for one chain
///
/// `rpc_url` may be `http(s)://` or `ws(s)://`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

/// Bridge contract addresses
///
/// # Fields
/// - `l1_portal` / `l2_portal`: record initiated messages and finalize incoming ones
/// - `l1_bridge` / `l2_bridge`: user-facing entry points for `bridgeETH`
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    pub l1_portal: Address,
    pub l2_portal: Address,
    pub l1_bridge: Address,
    pub l2_bridge: Address,
}

/// Rollup contracts the assertion tracker follows on L1
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub sequencer_inbox: Address,
    pub rollup: Address,
    /// L1 block to start backfilling from
    #[serde(default)]
    pub start_block: u64,
}

/// Transfer lifecycle tuning
///
/// # Fields
/// - `poll_interval_ms`: receipt polling and confirmation re-check interval
/// - `min_gas_limit`: gas forwarded to the destination call of `bridgeETH`
/// - `proof_retry`: attempts and backoff for unavailable proofs
/// - `rpc_retry`: attempts and backoff for transient RPC failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub poll_interval_ms: u64,
    pub min_gas_limit: u32,
    pub proof_retry: RetryPolicy,
    pub rpc_retry: RetryPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            min_gas_limit: 200_000,
            proof_retry: RetryPolicy::default(),
            rpc_retry: RetryPolicy::default(),
        }
    }
}

/// API server configuration
///
/// Controls the JSON-RPC API endpoint settings.
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on (e.g., 8645)
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
///
/// # Fields
/// - `url`: Database connection URL (e.g., "sqlite://relayer.db"). Empty keeps
///   transfers in memory only.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
}

fn default_private_key_env() -> String {
    "BRIDGER_PRIVATE_KEY".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
