//! Esplora-backed chain history oracle
//!
//! Used only when the pools run with address reuse enabled: an address is
//! "used" once Esplora reports any confirmed or mempool transaction for it.

use bitcoin::Address;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::source::ChainHistory;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transaction counters as returned by `GET /address/:address`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxStats {
    pub tx_count: u64,
    #[serde(default)]
    pub funded_txo_count: u64,
    #[serde(default)]
    pub funded_txo_sum: u64,
    #[serde(default)]
    pub spent_txo_count: u64,
    #[serde(default)]
    pub spent_txo_sum: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressStats {
    pub address: String,
    pub chain_stats: TxStats,
    pub mempool_stats: TxStats,
}

impl AddressStats {
    pub fn has_history(&self) -> bool {
        self.chain_stats.tx_count + self.mempool_stats.tx_count > 0
    }
}

pub struct EsploraChainHistory {
    client: Client,
    base_url: String,
}

impl EsploraChainHistory {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PoolError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PoolError::ChainQuery(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, PoolError> {
        Self::new(config.esplora_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn address_stats(&self, address: &Address) -> Result<AddressStats, PoolError> {
        let url = format!("{}/address/{}", self.base_url, address);
        log::debug!("Querying address history: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| PoolError::ChainQuery(format!("Failed to query {}: {}", address, e)))?;

        if !response.status().is_success() {
            return Err(PoolError::ChainQuery(format!(
                "Esplora returned {} for {}",
                response.status(),
                address
            )));
        }

        response
            .json::<AddressStats>()
            .map_err(|e| PoolError::ChainQuery(format!("Invalid address stats for {}: {}", address, e)))
    }
}

impl ChainHistory<Address> for EsploraChainHistory {
    fn has_on_chain_history(&self, address: &Address) -> Result<bool, PoolError> {
        Ok(self.address_stats(address)?.has_history())
    }
}
