use std::sync::{Mutex, MutexGuard};

use crate::error::PoolError;
use crate::source::AddressWatcher;

/// In-memory watch registry.
///
/// Collects every address handed to the pools' watcher until the owner
/// drains them into its notification backend.
#[derive(Debug, Default)]
pub struct WatchList<A> {
    pending: Mutex<Vec<A>>,
}

impl<A> WatchList<A> {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<A>>, PoolError> {
        self.pending
            .lock()
            .map_err(|_| PoolError::Watch("watch list lock poisoned".into()))
    }

    /// Addresses waiting to be drained
    pub fn len(&self) -> Result<usize, PoolError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PoolError> {
        Ok(self.lock()?.is_empty())
    }

    /// Take everything registered since the last drain
    pub fn drain(&self) -> Result<Vec<A>, PoolError> {
        Ok(std::mem::take(&mut *self.lock()?))
    }
}

impl<A: Clone> AddressWatcher<A> for WatchList<A> {
    fn watch(&self, addresses: &[A]) -> Result<(), PoolError> {
        self.lock()?.extend_from_slice(addresses);
        log::debug!("Watching {} new addresses", addresses.len());
        Ok(())
    }
}
