//! Durable checkpoint storage
//!
//! - `PoolState`: what survives a restart (derivation high-water marks and
//!   the next-to-use pair)
//! - `FileCheckpointStore`: JSON file, replaced atomically on save
//! - `MemoryCheckpointStore`: process-local, for tests and ephemeral wallets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::branch::Branch;
use crate::error::StorageError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchState {
    /// Highest index ever derived on this branch
    pub last_derived: Option<u32>,
    /// Encoded next-to-use address
    pub next_to_use: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolState {
    pub external: BranchState,
    pub internal: BranchState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PoolState {
    pub fn branch(&self, branch: Branch) -> &BranchState {
        match branch {
            Branch::External => &self.external,
            Branch::Internal => &self.internal,
        }
    }

    pub fn branch_mut(&mut self, branch: Branch) -> &mut BranchState {
        match branch {
            Branch::External => &mut self.external,
            Branch::Internal => &mut self.internal,
        }
    }
}

/// Opaque durable map holding one `PoolState`.
pub trait CheckpointStore {
    fn load(&self) -> Result<PoolState, StorageError>;

    fn save(&self, state: &PoolState) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    /// Load state from disk, or the fresh state if the file doesn't exist
    fn load(&self) -> Result<PoolState, StorageError> {
        if !self.path.exists() {
            log::debug!("No checkpoint at {:?}, starting fresh", self.path);
            return Ok(PoolState::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&contents)?;
        Ok(state)
    }

    /// Write to a sibling temp file, fsync it and rename over the checkpoint
    fn save(&self, state: &PoolState) -> Result<(), StorageError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        // The rename is durable only once the directory is synced
        sync_dir(parent.unwrap_or_else(|| Path::new(".")));
        Ok(())
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|handle| handle.sync_all()) {
        log::warn!("Failed to sync checkpoint directory {:?}: {}", dir, e);
    }
}

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<PoolState>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PoolState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<PoolState, StorageError> {
        self.state
            .lock()
            .map(|state| state.clone())
            .map_err(|_| StorageError::Unavailable("checkpoint lock poisoned".into()))
    }

    fn save(&self, state: &PoolState) -> Result<(), StorageError> {
        let mut stored = self
            .state
            .lock()
            .map_err(|_| StorageError::Unavailable("checkpoint lock poisoned".into()))?;
        *stored = state.clone();
        Ok(())
    }
}
