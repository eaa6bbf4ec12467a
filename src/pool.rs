//! Branch Address Pool
//!
//! A cache of already-derived, not-yet-consumed addresses for one branch of
//! the default account. Handing addresses out through the pool instead of
//! deriving them directly means a failed transaction build never burns an
//! index: tentative allocations are either committed (checkpoint advanced)
//! or rolled back (same addresses reissued in the same order).
//!
//! ## State
//!
//! - `addresses`: contiguous derived window, oldest unused first
//! - `cursor`: next address to hand out, `0 <= cursor <= addresses.len()`
//! - `index`: derivation index of `addresses[cursor]`, one past the last
//!   address handed out
//!
//! `index - cursor` is therefore always the derivation index of the window
//! front, which is where replenishment and checkpointing derive from.

use std::collections::VecDeque;
use std::fmt::Debug;

use serde::Serialize;

use crate::branch::Branch;
use crate::error::PoolError;
use crate::source::{AddressSource, AddressWatcher, ChainHistory, NextToUse};

/// Outcome of inspecting one address during the startup walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStep {
    /// Unused; add to the window and keep walking
    Keep,
    /// Add to the window and stop; everything below is used
    KeepAndStop,
    /// Used; stop without adding it
    Stop,
}

/// Stopping rule for the startup walk, selected by the reuse policy.
pub enum Reconciler<'a, A, C: ?Sized> {
    /// Reuse disabled: the persisted next-to-use address marks the boundary
    Checkpoint(Option<A>),
    /// Reuse enabled: the first address with on-chain history marks it
    ChainHistory(&'a C),
}

impl<'a, A, C> Reconciler<'a, A, C>
where
    A: PartialEq + Debug,
    C: ChainHistory<A> + ?Sized,
{
    pub fn new(address_reuse: bool, checkpoint: Option<A>, chain: &'a C) -> Self {
        if address_reuse {
            Reconciler::ChainHistory(chain)
        } else {
            Reconciler::Checkpoint(checkpoint)
        }
    }

    pub fn visit(&self, address: &A) -> Result<WalkStep, PoolError> {
        match self {
            Reconciler::Checkpoint(Some(checkpoint)) if checkpoint == address => {
                Ok(WalkStep::KeepAndStop)
            }
            Reconciler::Checkpoint(_) => Ok(WalkStep::Keep),
            Reconciler::ChainHistory(chain) => {
                if chain.has_on_chain_history(address)? {
                    Ok(WalkStep::Stop)
                } else {
                    Ok(WalkStep::Keep)
                }
            }
        }
    }
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub branch: Branch,
    pub started: bool,
    pub index: u32,
    pub cursor: usize,
    /// Addresses held in the window, consumed or not
    pub buffered: usize,
    /// Addresses in the window at or after the cursor
    pub unused: usize,
}

#[derive(Debug)]
pub struct BranchPool<A> {
    branch: Branch,
    addresses: Vec<A>,
    cursor: usize,
    index: u32,
    started: bool,
}

impl<A> BranchPool<A>
where
    A: Clone + PartialEq + Debug,
{
    /// Create an empty, unstarted pool
    pub fn new(branch: Branch) -> Self {
        Self {
            branch,
            addresses: Vec::new(),
            cursor: 0,
            index: 0,
            started: false,
        }
    }

    pub fn branch(&self) -> Branch {
        self.branch
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn addresses(&self) -> &[A] {
        &self.addresses
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            branch: self.branch,
            started: self.started,
            index: self.index,
            cursor: self.cursor,
            buffered: self.addresses.len(),
            unused: self.addresses.len().saturating_sub(self.cursor),
        }
    }

    /// Load the allocation point from the checkpoint and the derivation history.
    ///
    /// Walks back from the last derived index, at most `buffer_size` steps,
    /// collecting unused addresses until the reconciler says stop. A failure
    /// anywhere leaves the pool unstarted and empty.
    pub fn initialize<S, C>(
        &mut self,
        source: &S,
        chain: &C,
        address_reuse: bool,
        buffer_size: u32,
    ) -> Result<(), PoolError>
    where
        S: AddressSource<Address = A>,
        C: ChainHistory<A> + ?Sized,
    {
        // Reconnects reuse the running pool
        if self.started {
            log::debug!("{} address pool already started", self.branch);
            return Ok(());
        }

        let account = source.account();
        let checkpoint = source.next_to_use()?.into_branch(self.branch);

        let last = match source.last_derived_index(account, self.branch)? {
            Some(last) => last,
            None => {
                self.addresses.clear();
                self.index = 0;
                self.cursor = 0;
                self.started = true;
                log::info!("{} address pool started on fresh account", self.branch);
                return Ok(());
            }
        };

        let reconciler = Reconciler::new(address_reuse, checkpoint, chain);
        let (window, front) = self.walk_back(source, account, last, &reconciler, buffer_size)?;

        log::info!(
            "{} address pool started at index {} ({} buffered, last derived {})",
            self.branch,
            front,
            window.len(),
            last
        );

        self.addresses = window;
        self.index = front;
        self.cursor = 0;
        self.started = true;
        Ok(())
    }

    fn walk_back<S, C>(
        &self,
        source: &S,
        account: u32,
        last: u32,
        reconciler: &Reconciler<'_, A, C>,
        limit: u32,
    ) -> Result<(Vec<A>, u32), PoolError>
    where
        S: AddressSource<Address = A>,
        C: ChainHistory<A> + ?Sized,
    {
        let mut window = VecDeque::new();
        let mut front = last
            .checked_add(1)
            .ok_or(PoolError::IndexOverflow(self.branch))?;
        let mut next = Some(last);
        let mut traversed = 0;

        while let Some(index) = next {
            if traversed == limit {
                break;
            }
            let address = source.address_at(account, self.branch, index)?;
            match reconciler.visit(&address)? {
                WalkStep::Keep => {
                    window.push_front(address);
                    front = index;
                }
                WalkStep::KeepAndStop => {
                    window.push_front(address);
                    front = index;
                    break;
                }
                WalkStep::Stop => break,
            }
            traversed += 1;
            next = index.checked_sub(1);
        }

        Ok((window.into(), front))
    }

    /// Whether the next allocation derives a fresh buffer first
    pub fn needs_replenish(&self) -> bool {
        self.addresses.is_empty() || self.cursor + 1 >= self.addresses.len()
    }

    /// Hand out the next address, replenishing the window when it runs low.
    ///
    /// Repeated calls accumulate until `commit` or `rollback`.
    pub fn allocate<S, W>(
        &mut self,
        source: &S,
        watcher: &W,
        buffer_size: u32,
    ) -> Result<A, PoolError>
    where
        S: AddressSource<Address = A>,
        W: AddressWatcher<A> + ?Sized,
    {
        if !self.started {
            return Err(PoolError::NotStarted(self.branch));
        }

        if self.needs_replenish() {
            self.replenish(source, buffer_size)?;
        }

        let address = self
            .addresses
            .get(self.cursor)
            .cloned()
            .ok_or(PoolError::Exhausted(self.branch))?;
        let index = self
            .index
            .checked_add(1)
            .ok_or(PoolError::IndexOverflow(self.branch))?;
        self.cursor += 1;
        self.index = index;

        log::debug!(
            "New address for {} branch: {:?} (index {})",
            self.branch,
            address,
            self.index
        );

        watcher.watch(std::slice::from_ref(&address))?;

        Ok(address)
    }

    fn replenish<S>(&mut self, source: &S, buffer_size: u32) -> Result<(), PoolError>
    where
        S: AddressSource<Address = A>,
    {
        let start = u32::try_from(self.addresses.len())
            .ok()
            .and_then(|len| self.front_index().checked_add(len))
            .ok_or(PoolError::IndexOverflow(self.branch))?;

        let fresh = source.derive_addresses(source.account(), self.branch, start, buffer_size)?;
        if fresh.len() < buffer_size as usize {
            log::warn!(
                "Derived {} of {} requested addresses for {} branch from index {}",
                fresh.len(),
                buffer_size,
                self.branch,
                start
            );
        }
        log::debug!(
            "Replenished {} branch with {} addresses from index {}",
            self.branch,
            fresh.len(),
            start
        );

        self.addresses.extend(fresh);
        Ok(())
    }

    fn front_index(&self) -> u32 {
        self.index.saturating_sub(self.cursor as u32)
    }

    /// Finish a successful batch.
    ///
    /// Persists the next address to use for this branch and drops the
    /// consumed prefix. A failed checkpoint write is logged only; the
    /// addresses may already be in a broadcast transaction, so the
    /// in-memory advance stands.
    pub fn commit<S>(&mut self, source: &S)
    where
        S: AddressSource<Address = A>,
    {
        if self.cursor >= self.addresses.len() {
            self.addresses.clear();
            self.cursor = 0;
            return;
        }

        let next = self.addresses[self.cursor].clone();
        if let Err(e) = source.store_next_to_use(NextToUse::for_branch(self.branch, next)) {
            log::error!(
                "Failed to store next to use address for {} pool at index {} on batch finish: {}",
                self.branch,
                self.index,
                e
            );
        }

        self.addresses.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Abort a batch: everything handed out since the last commit becomes
    /// available again, in the same order.
    pub fn rollback(&mut self) {
        self.index = self.front_index();
        self.cursor = 0;

        log::debug!(
            "Batch rollback for {} branch to index {}",
            self.branch,
            self.index
        );
    }
}
