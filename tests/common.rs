/// Common test utilities for address pool integration tests
///
/// This module provides shared test infrastructure including:
/// - The BIP84 test-vector account xpub ("abandon ... about")
/// - Pools backed by a checkpoint file in a temp directory
/// - Restart helpers that reopen the same checkpoint file
use address_pool::{
    AddressPools, FileCheckpointStore, NoChainHistory, PoolConfig, WatchList, XpubAddressSource,
};
use bip39::Mnemonic;
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

pub const MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub type FilePools = AddressPools<XpubAddressSource<FileCheckpointStore>, NoChainHistory, WatchList<Address>>;

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Account xpub at m/84'/1'/0'
pub fn test_xpub() -> Xpub {
    let secp = Secp256k1::new();
    let seed = Mnemonic::parse(MNEMONIC)
        .expect("Failed to parse mnemonic")
        .to_seed("");
    let master = Xpriv::new_master(Network::Testnet, &seed).expect("Failed to create master key");
    let path = DerivationPath::from_str("m/84'/1'/0'").expect("Invalid derivation path");
    let account = master
        .derive_priv(&secp, &path)
        .expect("Failed to derive account key");
    Xpub::from_priv(&secp, &account)
}

/// Checkpoint file location shared by every "session" of a test
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        init_logging();
        let temp_dir = TempDir::new()?;
        log::info!("Test directory: {:?}", temp_dir.path());
        Ok(Self { temp_dir })
    }

    pub fn state_path(&self) -> PathBuf {
        self.temp_dir.path().join("address_pool.json")
    }

    pub fn config(&self) -> PoolConfig {
        PoolConfig {
            state_path: self.state_path(),
            ..PoolConfig::default()
        }
    }

    pub fn source(&self) -> anyhow::Result<XpubAddressSource<FileCheckpointStore>> {
        Ok(source_at(&self.state_path())?)
    }

    /// Open and initialize pools as a freshly started process would
    pub fn open(&self, config: PoolConfig) -> anyhow::Result<FilePools> {
        let pools = AddressPools::new(self.source()?, NoChainHistory, WatchList::new(), config);
        pools.initialize()?;
        Ok(pools)
    }
}

pub fn source_at(path: &Path) -> address_pool::Result<XpubAddressSource<FileCheckpointStore>> {
    XpubAddressSource::new(test_xpub(), Network::Testnet, FileCheckpointStore::new(path))
}
