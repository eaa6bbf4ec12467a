/// Address pool configuration from environment variables
///
/// Controls the replenishment buffer, the reuse policy used when reconciling
/// on startup, and where the chain oracle and checkpoint file live.

use std::env;
use std::path::PathBuf;

/// Number of addresses derived per replenishment and walked back on startup
pub const DEFAULT_BUFFER_SIZE: u32 = 20;

#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Addresses derived per replenishment; also bounds the startup walk
    pub buffer_size: u32,
    /// Reconcile against chain history instead of the stored checkpoint
    pub address_reuse: bool,
    /// Bitcoin network addresses are encoded for
    pub network: bitcoin::Network,
    /// Esplora API base URL (chain usage oracle)
    pub esplora_url: String,
    /// Checkpoint file location
    pub state_path: PathBuf,
}

impl PoolConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ADDRESS_POOL_BUFFER`: replenishment size (default 20)
    /// - `ADDRESS_REUSE`: "1"/"true" to reconcile against chain history
    /// - `BITCOIN_NETWORK`: "signet" (default), "regtest", "testnet" or "bitcoin"
    /// - `ESPLORA_URL`: Esplora API endpoint (network default otherwise)
    /// - `ADDRESS_POOL_STATE`: checkpoint file path (default ./address_pool.json)
    pub fn from_env() -> Self {
        let network_str = env::var("BITCOIN_NETWORK")
            .unwrap_or_else(|_| "signet".to_string())
            .to_lowercase();

        let network = match network_str.as_str() {
            "regtest" => bitcoin::Network::Regtest,
            "testnet" => bitcoin::Network::Testnet,
            "bitcoin" | "mainnet" => bitcoin::Network::Bitcoin,
            "signet" | "" => bitcoin::Network::Signet,
            other => {
                log::warn!("Unknown network '{}', defaulting to Signet", other);
                bitcoin::Network::Signet
            }
        };
        log::info!("Using {} network", network);

        let esplora_url = env::var("ESPLORA_URL").unwrap_or_else(|_| default_esplora_url(network));
        log::info!("Esplora URL: {}", esplora_url);

        let buffer_size = match env::var("ADDRESS_POOL_BUFFER") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(size) => size,
                Err(_) => {
                    log::warn!(
                        "Invalid ADDRESS_POOL_BUFFER '{}', using {}",
                        raw,
                        DEFAULT_BUFFER_SIZE
                    );
                    DEFAULT_BUFFER_SIZE
                }
            },
            Err(_) => DEFAULT_BUFFER_SIZE,
        };

        let address_reuse = env::var("ADDRESS_REUSE")
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let state_path = env::var("ADDRESS_POOL_STATE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./address_pool.json"));

        Self {
            network,
            esplora_url,
            address_reuse,
            state_path,
            ..Default::default()
        }
        .with_buffer_size(buffer_size)
    }

    /// Set the buffer size, clamping zero to one
    pub fn with_buffer_size(mut self, buffer_size: u32) -> Self {
        if buffer_size == 0 {
            log::warn!("Address pool buffer size of 0 requested, using 1");
        }
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_address_reuse(mut self, address_reuse: bool) -> Self {
        self.address_reuse = address_reuse;
        self
    }
}

impl Default for PoolConfig {
    /// Default configuration (Signet, 20-address buffer, no reuse)
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            address_reuse: false,
            network: bitcoin::Network::Signet,
            esplora_url: default_esplora_url(bitcoin::Network::Signet),
            state_path: PathBuf::from("./address_pool.json"),
        }
    }
}

fn default_esplora_url(network: bitcoin::Network) -> String {
    match network {
        bitcoin::Network::Regtest => "http://localhost:3000".to_string(),
        bitcoin::Network::Testnet => "https://mempool.space/testnet/api".to_string(),
        bitcoin::Network::Bitcoin => "https://mempool.space/api".to_string(),
        _ => "https://mempool.space/signet/api".to_string(),
    }
}
