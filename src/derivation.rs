use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::{Address, Network};
use chrono::Utc;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::branch::Branch;
use crate::error::{PoolError, StorageError};
use crate::source::{AddressSource, NextToUse, DEFAULT_ACCOUNT};
use crate::store::{CheckpointStore, PoolState};

/// Watch-only BIP84 derivation source over an account-level xpub.
///
/// Derives P2WPKH addresses at `<branch>/<index>` below the xpub and keeps
/// the derivation high-water marks and the next-to-use pair in a
/// `CheckpointStore`. All state changes go through one mutex, so the
/// external and internal checkpoints are always written as a pair.
pub struct XpubAddressSource<St> {
    xpub: Xpub,
    network: Network,
    account: u32,
    secp: Secp256k1<VerifyOnly>,
    store: St,
    state: Mutex<PoolState>,
}

impl<St: CheckpointStore> XpubAddressSource<St> {
    pub fn new(xpub: Xpub, network: Network, store: St) -> Result<Self, PoolError> {
        let state = store.load()?;
        Ok(Self {
            xpub,
            network,
            account: DEFAULT_ACCOUNT,
            secp: Secp256k1::verification_only(),
            store,
            state: Mutex::new(state),
        })
    }

    /// Build from a BIP84 descriptor such as `[fp/84h/1h/0h]tpub.../<0;1>/*`
    pub fn from_descriptor(descriptor: &str, network: Network, store: St) -> Result<Self, PoolError> {
        let xpub = extract_xpub(descriptor)?;
        Self::new(xpub, network, store)
    }

    /// Serve a different account number than the default
    pub fn with_account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Snapshot of the persisted state
    pub fn state(&self) -> Result<PoolState, PoolError> {
        Ok(self.lock_state()?.clone())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, PoolState>, PoolError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Unavailable("address source state lock poisoned".into()).into())
    }

    fn check_account(&self, account: u32) -> Result<(), PoolError> {
        if account != self.account {
            return Err(PoolError::Derivation(format!(
                "unknown account {} (source serves account {})",
                account, self.account
            )));
        }
        Ok(())
    }

    /// Derive the P2WPKH address at `<branch>/<index>`
    fn derive(&self, branch: Branch, index: u32) -> Result<Address, PoolError> {
        let branch_child = ChildNumber::from_normal_idx(branch.child_number())
            .map_err(|e| PoolError::Derivation(e.to_string()))?;
        let child_number =
            ChildNumber::from_normal_idx(index).map_err(|e| PoolError::Derivation(e.to_string()))?;

        let derived_key = self
            .xpub
            .derive_pub(&self.secp, &[branch_child, child_number])
            .map_err(|e| PoolError::Derivation(e.to_string()))?;

        let compressed = CompressedPublicKey(derived_key.public_key);
        Ok(Address::p2wpkh(&compressed, self.network))
    }

    fn parse_stored(&self, encoded: &str) -> Result<Address, PoolError> {
        let address = Address::from_str(encoded)
            .map_err(|e| StorageError::InvalidAddress(format!("{}: {}", encoded, e)))?
            .require_network(self.network)
            .map_err(|e| StorageError::InvalidAddress(format!("{}: {}", encoded, e)))?;
        Ok(address)
    }

    /// Persist `updated` and only then make it the live state
    fn persist(&self, state: &mut PoolState, mut updated: PoolState) -> Result<(), PoolError> {
        updated.updated_at = Some(Utc::now());
        self.store.save(&updated)?;
        *state = updated;
        Ok(())
    }
}

impl<St: CheckpointStore> AddressSource for XpubAddressSource<St> {
    type Address = Address;

    fn account(&self) -> u32 {
        self.account
    }

    fn derive_addresses(
        &self,
        account: u32,
        branch: Branch,
        start: u32,
        count: u32,
    ) -> Result<Vec<Address>, PoolError> {
        self.check_account(account)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let last = start
            .checked_add(count - 1)
            .ok_or(PoolError::IndexOverflow(branch))?;

        let addresses = (start..=last)
            .map(|index| self.derive(branch, index))
            .collect::<Result<Vec<_>, _>>()?;

        // The high-water mark must be durable before the addresses leave
        let mut state = self.lock_state()?;
        if state.branch(branch).last_derived.map_or(true, |known| known < last) {
            let mut updated = state.clone();
            updated.branch_mut(branch).last_derived = Some(last);
            self.persist(&mut state, updated)?;
        }

        Ok(addresses)
    }

    fn last_derived_index(&self, account: u32, branch: Branch) -> Result<Option<u32>, PoolError> {
        self.check_account(account)?;
        Ok(self.lock_state()?.branch(branch).last_derived)
    }

    fn address_at(&self, account: u32, branch: Branch, index: u32) -> Result<Address, PoolError> {
        self.check_account(account)?;
        self.derive(branch, index)
    }

    fn next_to_use(&self) -> Result<NextToUse<Address>, PoolError> {
        let state = self.lock_state()?;
        let external = state
            .external
            .next_to_use
            .as_deref()
            .map(|encoded| self.parse_stored(encoded))
            .transpose()?;
        let internal = state
            .internal
            .next_to_use
            .as_deref()
            .map(|encoded| self.parse_stored(encoded))
            .transpose()?;
        Ok(NextToUse { external, internal })
    }

    fn store_next_to_use(&self, update: NextToUse<Address>) -> Result<(), PoolError> {
        let mut state = self.lock_state()?;
        let mut updated = state.clone();
        for branch in Branch::ALL {
            if let Some(address) = update.get(branch) {
                updated.branch_mut(branch).next_to_use = Some(address.to_string());
            }
        }
        self.persist(&mut state, updated)
    }
}

/// Extract the xpub/tpub from a BIP84 descriptor string
fn extract_xpub(descriptor: &str) -> Result<Xpub, PoolError> {
    let start = descriptor
        .find("tpub")
        .or_else(|| descriptor.find("xpub"))
        .ok_or_else(|| PoolError::Derivation("No xpub/tpub found in descriptor".into()))?;

    let end = descriptor[start..]
        .find(['/', ')'])
        .map(|i| start + i)
        .unwrap_or(descriptor.len());

    Xpub::from_str(&descriptor[start..end])
        .map_err(|e| PoolError::Derivation(format!("Invalid descriptor xpub: {}", e)))
}
