//! Error types for address pool operations
//!
//! `PoolError` is what callers of the pools see. `StorageError` covers the
//! durable checkpoint store and is folded into `PoolError::Persistence`.

use thiserror::Error;

use crate::branch::Branch;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Address pool not started: {0} branch")]
    NotStarted(Branch),

    #[error("Unknown branch: {0}")]
    UnknownBranch(u32),

    #[error("Derivation error: {0}")]
    Derivation(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Chain query error: {0}")]
    ChainQuery(String),

    #[error("Watch notification failed: {0}")]
    Watch(String),

    #[error("Derivation index overflow on {0} branch")]
    IndexOverflow(Branch),

    #[error("No address available on {0} branch after replenishment")]
    Exhausted(Branch),

    #[error("Lock poisoned: {0} branch")]
    LockPoisoned(Branch),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stored address: {0}")]
    InvalidAddress(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
