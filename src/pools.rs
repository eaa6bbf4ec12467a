//! Pool Pair Coordinator
//!
//! Owns the external and internal pools of the default account, each behind
//! its own mutex. Callers either take single addresses
//! (`get_external_address`, `get_internal_address`) or open an
//! [`AddressBatch`] that holds the branch lock until it is committed, rolled
//! back or dropped.

use std::sync::{Mutex, MutexGuard};

use crate::branch::Branch;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pool::{BranchPool, PoolStats};
use crate::source::{AddressSource, AddressWatcher, ChainHistory, NextToUse};

pub struct AddressPools<S: AddressSource, C, W> {
    source: S,
    chain: C,
    watcher: W,
    config: PoolConfig,
    external: Mutex<BranchPool<S::Address>>,
    internal: Mutex<BranchPool<S::Address>>,
}

impl<S, C, W> AddressPools<S, C, W>
where
    S: AddressSource,
    C: ChainHistory<S::Address>,
    W: AddressWatcher<S::Address>,
{
    /// Create both pools, unstarted
    pub fn new(source: S, chain: C, watcher: W, config: PoolConfig) -> Self {
        Self {
            source,
            chain,
            watcher,
            config,
            external: Mutex::new(BranchPool::new(Branch::External)),
            internal: Mutex::new(BranchPool::new(Branch::Internal)),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self, branch: Branch) -> Result<MutexGuard<'_, BranchPool<S::Address>>, PoolError> {
        let pool = match branch {
            Branch::External => &self.external,
            Branch::Internal => &self.internal,
        };
        pool.lock().map_err(|_| PoolError::LockPoisoned(branch))
    }

    /// Start both pools from the persisted checkpoint (external first).
    ///
    /// Pools that are already running are left untouched, so this is safe to
    /// call again after a backend reconnect.
    pub fn initialize(&self) -> Result<(), PoolError> {
        for branch in Branch::ALL {
            let mut pool = self.lock(branch)?;
            pool.initialize(
                &self.source,
                &self.chain,
                self.config.address_reuse,
                self.config.buffer_size,
            )?;
        }
        Ok(())
    }

    /// Open an allocation batch on `branch`, blocking until the branch is free.
    ///
    /// The batch holds the branch lock until it is finished. Callers that
    /// need both branches at once must open the external batch first (the
    /// order of `Branch::ALL`, also used by `initialize` and `close_pools`).
    /// Taking an external address while holding an internal batch can
    /// deadlock against `close_pools`.
    pub fn begin_batch(&self, branch: Branch) -> Result<AddressBatch<'_, S, W>, PoolError> {
        let pool = self.lock(branch)?;
        if !pool.is_started() {
            return Err(PoolError::NotStarted(branch));
        }
        Ok(AddressBatch {
            pool,
            source: &self.source,
            watcher: &self.watcher,
            buffer_size: self.config.buffer_size,
            issued: 0,
            finished: false,
        })
    }

    /// Next receiving address, committed immediately
    pub fn get_external_address(&self) -> Result<S::Address, PoolError> {
        self.single(Branch::External)
    }

    /// Next change address, committed immediately
    pub fn get_internal_address(&self) -> Result<S::Address, PoolError> {
        self.single(Branch::Internal)
    }

    /// Next address for a raw BIP44 change number (0 external, 1 internal)
    pub fn get_address(&self, change: u32) -> Result<S::Address, PoolError> {
        self.single(Branch::try_from(change)?)
    }

    fn single(&self, branch: Branch) -> Result<S::Address, PoolError> {
        let mut batch = self.begin_batch(branch)?;
        let address = batch.next_address()?;
        batch.commit();
        Ok(address)
    }

    pub fn stats(&self, branch: Branch) -> Result<PoolStats, PoolError> {
        Ok(self.lock(branch)?.stats())
    }

    /// Write the final checkpoint at shutdown.
    ///
    /// Takes one more address from each branch and persists the pair as the
    /// next-to-use checkpoint, so a restart resumes strictly after anything
    /// this session handed out. The in-memory index advances past that
    /// address, but the persisted checkpoint names it, so the next session
    /// hands it out first. Does nothing unless both pools are started.
    pub fn close_pools(&self) -> Result<(), PoolError> {
        let mut external = self.lock(Branch::External)?;
        let mut internal = self.lock(Branch::Internal)?;

        if !external.is_started() || !internal.is_started() {
            log::debug!("Address pools not started, skipping close checkpoint");
            return Ok(());
        }

        let next_external = external
            .allocate(&self.source, &self.watcher, self.config.buffer_size)
            .map_err(|e| {
                log::error!("Failed to get next to use address for external pool: {}", e);
                e
            })?;
        let next_internal = internal
            .allocate(&self.source, &self.watcher, self.config.buffer_size)
            .map_err(|e| {
                log::error!("Failed to get next to use address for internal pool: {}", e);
                e
            })?;

        self.source
            .store_next_to_use(NextToUse {
                external: Some(next_external),
                internal: Some(next_internal),
            })
            .map_err(|e| {
                log::error!("Failed to store next to use addresses on close: {}", e);
                e
            })?;

        log::info!(
            "Address pools closed at external index {}, internal index {}",
            external.index(),
            internal.index()
        );
        Ok(())
    }
}

/// Exclusive allocation batch on one branch.
///
/// Holds the branch lock for its whole lifetime. Finish it with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback); dropping an
/// unfinished batch rolls it back.
#[must_use = "an address batch must be committed or rolled back"]
pub struct AddressBatch<'a, S: AddressSource, W> {
    pool: MutexGuard<'a, BranchPool<S::Address>>,
    source: &'a S,
    watcher: &'a W,
    buffer_size: u32,
    issued: usize,
    finished: bool,
}

impl<'a, S, W> AddressBatch<'a, S, W>
where
    S: AddressSource,
    W: AddressWatcher<S::Address>,
{
    pub fn branch(&self) -> Branch {
        self.pool.branch()
    }

    /// Addresses handed out by this batch so far
    pub fn issued(&self) -> usize {
        self.issued
    }

    pub fn next_address(&mut self) -> Result<S::Address, PoolError> {
        let address = self
            .pool
            .allocate(self.source, self.watcher, self.buffer_size);
        if address.is_ok() {
            self.issued += 1;
        }
        address
    }

    pub fn commit(mut self) {
        self.pool.commit(self.source);
        self.finished = true;
    }

    pub fn rollback(mut self) {
        self.pool.rollback();
        self.finished = true;
    }
}

impl<'a, S: AddressSource, W> Drop for AddressBatch<'a, S, W> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Address batch on {} branch dropped unfinished, rolling back",
                self.pool.branch()
            );
            self.pool.rollback();
        }
    }
}
