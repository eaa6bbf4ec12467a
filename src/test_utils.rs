//! Scripted collaborators for unit tests
//!
//! Addresses are plain strings of the form `"<branch>/<index>"` so tests can
//! assert on derivation positions directly.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::branch::Branch;
use crate::error::{PoolError, StorageError};
use crate::source::{AddressSource, AddressWatcher, ChainHistory, NextToUse, DEFAULT_ACCOUNT};

pub fn addr(branch: Branch, index: u32) -> String {
    format!("{}/{}", branch, index)
}

fn slot(branch: Branch) -> usize {
    match branch {
        Branch::External => 0,
        Branch::Internal => 1,
    }
}

#[derive(Default)]
struct ScriptedState {
    last_derived: [Option<u32>; 2],
    checkpoint: [Option<String>; 2],
    fail_at: Option<u32>,
    fail_stores: bool,
    derive_calls: usize,
    stored: Vec<NextToUse<String>>,
}

/// Deterministic in-memory source with failure injection
#[derive(Default)]
pub struct ScriptedSource {
    state: Mutex<ScriptedState>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_derived(self, branch: Branch, index: u32) -> Self {
        self.state.lock().unwrap().last_derived[slot(branch)] = Some(index);
        self
    }

    pub fn with_checkpoint(self, branch: Branch, index: u32) -> Self {
        self.state.lock().unwrap().checkpoint[slot(branch)] = Some(addr(branch, index));
        self
    }

    /// Any derivation touching `index` fails
    pub fn fail_at(&self, index: Option<u32>) {
        self.state.lock().unwrap().fail_at = index;
    }

    pub fn fail_stores(&self, fail: bool) {
        self.state.lock().unwrap().fail_stores = fail;
    }

    pub fn derive_calls(&self) -> usize {
        self.state.lock().unwrap().derive_calls
    }

    pub fn stored(&self) -> Vec<NextToUse<String>> {
        self.state.lock().unwrap().stored.clone()
    }

    pub fn checkpoint(&self, branch: Branch) -> Option<String> {
        self.state.lock().unwrap().checkpoint[slot(branch)].clone()
    }

    pub fn last_derived(&self, branch: Branch) -> Option<u32> {
        self.state.lock().unwrap().last_derived[slot(branch)]
    }
}

impl AddressSource for ScriptedSource {
    type Address = String;

    fn derive_addresses(
        &self,
        account: u32,
        branch: Branch,
        start: u32,
        count: u32,
    ) -> Result<Vec<String>, PoolError> {
        if account != DEFAULT_ACCOUNT {
            return Err(PoolError::Derivation(format!("unknown account {}", account)));
        }
        let mut state = self.state.lock().unwrap();
        state.derive_calls += 1;
        let end = start + count;
        if let Some(fail) = state.fail_at {
            if (start..end).contains(&fail) {
                return Err(PoolError::Derivation(format!("key store locked at {}", fail)));
            }
        }
        if count > 0 {
            let last = &mut state.last_derived[slot(branch)];
            *last = Some(last.map_or(end - 1, |l| l.max(end - 1)));
        }
        Ok((start..end).map(|i| addr(branch, i)).collect())
    }

    fn last_derived_index(&self, _account: u32, branch: Branch) -> Result<Option<u32>, PoolError> {
        Ok(self.state.lock().unwrap().last_derived[slot(branch)])
    }

    fn address_at(&self, _account: u32, branch: Branch, index: u32) -> Result<String, PoolError> {
        if self.state.lock().unwrap().fail_at == Some(index) {
            return Err(PoolError::Derivation(format!("key store locked at {}", index)));
        }
        Ok(addr(branch, index))
    }

    fn next_to_use(&self) -> Result<NextToUse<String>, PoolError> {
        let state = self.state.lock().unwrap();
        Ok(NextToUse {
            external: state.checkpoint[0].clone(),
            internal: state.checkpoint[1].clone(),
        })
    }

    fn store_next_to_use(&self, update: NextToUse<String>) -> Result<(), PoolError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_stores {
            return Err(StorageError::Unavailable("scripted failure".into()).into());
        }
        if let Some(external) = &update.external {
            state.checkpoint[0] = Some(external.clone());
        }
        if let Some(internal) = &update.internal {
            state.checkpoint[1] = Some(internal.clone());
        }
        state.stored.push(update);
        Ok(())
    }
}

/// Watcher that records everything it is told, optionally failing
#[derive(Default)]
pub struct RecordingWatcher {
    seen: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

impl RecordingWatcher {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl AddressWatcher<String> for RecordingWatcher {
    fn watch(&self, addresses: &[String]) -> Result<(), PoolError> {
        if *self.fail.lock().unwrap() {
            return Err(PoolError::Watch("notifier offline".into()));
        }
        self.seen.lock().unwrap().extend_from_slice(addresses);
        Ok(())
    }
}

/// Chain oracle backed by a fixed set of used addresses
#[derive(Default)]
pub struct UsedSet {
    used: HashSet<String>,
    fail: bool,
}

impl UsedSet {
    pub fn new(used: impl IntoIterator<Item = String>) -> Self {
        Self {
            used: used.into_iter().collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            used: HashSet::new(),
            fail: true,
        }
    }
}

impl ChainHistory<String> for UsedSet {
    fn has_on_chain_history(&self, address: &String) -> Result<bool, PoolError> {
        if self.fail {
            return Err(PoolError::ChainQuery("esplora unreachable".into()));
        }
        Ok(self.used.contains(address))
    }
}
