//! Collaborator interfaces consumed by the pools
//!
//! - `AddressSource`: deterministic derivation plus the persisted
//!   next-to-use checkpoint pair
//! - `ChainHistory`: on-chain usage oracle, consulted only in reuse mode
//! - `AddressWatcher`: told about every address handed out

use std::fmt::Debug;
use std::sync::Arc;

use crate::branch::Branch;
use crate::error::PoolError;

/// The account the pools allocate for
pub const DEFAULT_ACCOUNT: u32 = 0;

/// Persisted "next address to use" per branch.
///
/// When storing, a `None` side means "leave unchanged".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextToUse<A> {
    pub external: Option<A>,
    pub internal: Option<A>,
}

impl<A> NextToUse<A> {
    pub fn empty() -> Self {
        Self {
            external: None,
            internal: None,
        }
    }

    /// An update touching a single branch
    pub fn for_branch(branch: Branch, address: A) -> Self {
        match branch {
            Branch::External => Self {
                external: Some(address),
                internal: None,
            },
            Branch::Internal => Self {
                external: None,
                internal: Some(address),
            },
        }
    }

    pub fn get(&self, branch: Branch) -> Option<&A> {
        match branch {
            Branch::External => self.external.as_ref(),
            Branch::Internal => self.internal.as_ref(),
        }
    }

    pub fn into_branch(self, branch: Branch) -> Option<A> {
        match branch {
            Branch::External => self.external,
            Branch::Internal => self.internal,
        }
    }
}

/// Deterministic address derivation and checkpoint persistence.
///
/// Implementations must make `store_next_to_use` atomic for the pair: both
/// branches commit through the same source concurrently.
pub trait AddressSource {
    type Address: Clone + PartialEq + Debug;

    /// Account the source serves by default
    fn account(&self) -> u32 {
        DEFAULT_ACCOUNT
    }

    /// Derive `count` consecutive addresses starting at `start`
    fn derive_addresses(
        &self,
        account: u32,
        branch: Branch,
        start: u32,
        count: u32,
    ) -> Result<Vec<Self::Address>, PoolError>;

    /// Highest index ever derived, `None` for a fresh account
    fn last_derived_index(&self, account: u32, branch: Branch) -> Result<Option<u32>, PoolError>;

    fn address_at(&self, account: u32, branch: Branch, index: u32)
        -> Result<Self::Address, PoolError>;

    fn next_to_use(&self) -> Result<NextToUse<Self::Address>, PoolError>;

    fn store_next_to_use(&self, update: NextToUse<Self::Address>) -> Result<(), PoolError>;
}

/// Answers whether an address has ever appeared on-chain.
pub trait ChainHistory<A> {
    fn has_on_chain_history(&self, address: &A) -> Result<bool, PoolError>;
}

/// Oracle for wallets with address reuse disabled; it is never consulted
/// in that mode, and answers with an error if it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChainHistory;

impl<A: Debug> ChainHistory<A> for NoChainHistory {
    fn has_on_chain_history(&self, address: &A) -> Result<bool, PoolError> {
        Err(PoolError::ChainQuery(format!(
            "no chain history available to check {:?}",
            address
        )))
    }
}

/// Receives every address handed out so incoming activity can be watched.
pub trait AddressWatcher<A> {
    fn watch(&self, addresses: &[A]) -> Result<(), PoolError>;
}

impl<A, T: ChainHistory<A> + ?Sized> ChainHistory<A> for Arc<T> {
    fn has_on_chain_history(&self, address: &A) -> Result<bool, PoolError> {
        (**self).has_on_chain_history(address)
    }
}

impl<A, T: AddressWatcher<A> + ?Sized> AddressWatcher<A> for Arc<T> {
    fn watch(&self, addresses: &[A]) -> Result<(), PoolError> {
        (**self).watch(addresses)
    }
}
