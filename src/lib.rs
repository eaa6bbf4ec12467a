//! Address Pool: crash-safe receive/change address allocation for HD wallets
//!
//! Hands out addresses from the external (receive) and internal (change)
//! branches of a BIP84 account without ever reissuing an address that was
//! committed, and resumes after a restart from a persisted checkpoint.
//!
//! # Architecture
//!
//! - **Branch Pool**: windowed buffer per branch with commit/rollback
//! - **Pool Coordinator**: both pools behind per-branch locks, batches, shutdown checkpoint
//! - **Xpub Source**: watch-only derivation plus the durable checkpoint
//! - **Chain History**: Esplora usage oracle for address-reuse wallets
//!
//! # Example
//!
//! ```ignore
//! use address_pool::{
//!     AddressPools, Branch, FileCheckpointStore, NoChainHistory, PoolConfig, WatchList,
//!     XpubAddressSource,
//! };
//!
//! let config = PoolConfig::from_env();
//! let store = FileCheckpointStore::new(&config.state_path);
//! let source = XpubAddressSource::from_descriptor(&descriptor, config.network, store)?;
//!
//! let pools = AddressPools::new(source, NoChainHistory, WatchList::new(), config);
//! pools.initialize()?;
//!
//! // Several outputs for one transaction
//! let mut batch = pools.begin_batch(Branch::External)?;
//! let first = batch.next_address()?;
//! let second = batch.next_address()?;
//! batch.commit();
//!
//! let change = pools.get_internal_address()?;
//! pools.close_pools()?;
//! ```

// Public modules
pub mod branch;
pub mod config;
pub mod derivation;
pub mod error;
pub mod esplora;
pub mod pool;
pub mod pools;
pub mod source;
pub mod store;
pub mod watch;

#[cfg(test)]
mod test_utils;

// Re-exports for convenience
pub use branch::Branch;
pub use config::{PoolConfig, DEFAULT_BUFFER_SIZE};
pub use derivation::XpubAddressSource;
pub use error::{PoolError, StorageError};
pub use esplora::{AddressStats, EsploraChainHistory};
pub use pool::{BranchPool, PoolStats, Reconciler};
pub use pools::{AddressBatch, AddressPools};
pub use source::{AddressSource, AddressWatcher, ChainHistory, NextToUse, NoChainHistory, DEFAULT_ACCOUNT};
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, PoolState};
pub use watch::WatchList;

// Common result type
pub type Result<T> = std::result::Result<T, PoolError>;
