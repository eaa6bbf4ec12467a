//! HD sub-chains within an account

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PoolError;

/// BIP44 change level: external (receive) or internal (change) addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    External,
    Internal,
}

impl Branch {
    /// Both branches, in lock order.
    pub const ALL: [Branch; 2] = [Branch::External, Branch::Internal];

    /// The non-hardened child number used for this branch in the derivation path
    pub fn child_number(self) -> u32 {
        match self {
            Branch::External => 0,
            Branch::Internal => 1,
        }
    }
}

impl TryFrom<u32> for Branch {
    type Error = PoolError;

    fn try_from(change: u32) -> Result<Self, Self::Error> {
        match change {
            0 => Ok(Branch::External),
            1 => Ok(Branch::Internal),
            other => Err(PoolError::UnknownBranch(other)),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::External => write!(f, "external"),
            Branch::Internal => write!(f, "internal"),
        }
    }
}
