use std::fs;
use std::path::PathBuf;

use fpd_common::logging::LoggingConfig;
use fpd_core::ProviderInstanceConfig;
use fpd_poller::PollerConfig;
use serde::Deserialize;

use crate::args::Args;

/// Parameters for the deterministic in-memory chain client:
/// no production chain RPC client is in scope, so the daemon always runs
/// against `fpd_chain_client::MockChainClient`, configured here the way a
/// real endpoint's connection details would be.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChainConfig {
    pub activation_height: u64,
    #[serde(default)]
    pub finalization_lag: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Config {
    pub seed_key: PathBuf,
    pub store_path: PathBuf,
    pub rpc_addr: String,
    pub chain_id: String,
    #[serde(default = "default_network")]
    pub network: String,
    pub chain: ChainConfig,
    pub poller: PollerConfig,
    pub instance: ProviderInstanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_network() -> String {
    "regtest".to_string()
}

impl Config {
    /// Loads the TOML config named by `--config`, then lets the remaining
    /// CLI flags (`--seed-key`, `--store-path`, `--rpc-addr`) override the
    /// fields they cover (CLI flags win).
    pub(crate) fn from_args(args: &Args) -> Result<Config, String> {
        let config_path = args
            .config
            .as_ref()
            .ok_or_else(|| "args: no --config provided".to_string())?;
        let raw = fs::read_to_string(config_path)
            .map_err(|e| format!("failed to read config at {}: {e}", config_path.display()))?;
        let mut config: Config = toml::from_str(&raw).map_err(|e| format!("invalid config: {e}"))?;

        if let Some(seed_key) = &args.seed_key {
            config.seed_key = seed_key.clone();
        }
        if let Some(store_path) = &args.store_path {
            config.store_path = store_path.clone();
        }
        if let Some(rpc_addr) = &args.rpc_addr {
            config.rpc_addr = rpc_addr.clone();
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        Ok(config)
    }

    pub(crate) fn bitcoin_network(&self) -> Result<bitcoin::Network, String> {
        self.network
            .parse()
            .map_err(|_| format!("invalid network: {}", self.network))
    }
}
