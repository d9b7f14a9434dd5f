//! Motor position persistence.
//!
//! Readbacks of every task that opts in through
//! [`SimTask::state_key`](simioc_common::sim::SimTask::state_key) are saved
//! with bincode at shutdown and restored before startup.

use serde::{Deserialize, Serialize};
use simioc_common::sim::SimError;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted position of one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedPosition {
    /// Task state key (the motor PV prefix)
    pub key: String,
    /// Last readback
    pub position: f64,
}

/// Contents of a state file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PersistedState {
    /// Format version
    pub version: u32,
    /// IOC the positions belong to
    pub ioc: String,
    /// Positions by key
    pub positions: Vec<PersistedPosition>,
    /// Unix epoch seconds of the last save
    pub saved_at: u64,
}

impl PersistedState {
    /// Current state format version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Empty state for `ioc`.
    pub fn new(ioc: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            ioc: ioc.into(),
            positions: Vec::new(),
            saved_at: 0,
        }
    }

    /// Position saved under `key`.
    pub fn position(&self, key: &str) -> Option<f64> {
        self.positions
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.position)
    }
}

/// Reads and writes one state file.
#[derive(Debug, Clone)]
pub struct StatePersistence {
    path: PathBuf,
}

impl StatePersistence {
    /// Persistence backed by `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// State file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save `state`, stamping the save time.
    pub fn save(&self, state: &PersistedState) -> Result<(), SimError> {
        debug!("Saving state to {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SimError::Persistence(format!("Failed to create directory: {}", e))
            })?;
        }

        let mut state = state.clone();
        state.saved_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let file = File::create(&self.path).map_err(|e| {
            SimError::Persistence(format!("Failed to create state file: {}", e))
        })?;
        bincode::serialize_into(BufWriter::new(file), &state).map_err(|e| {
            SimError::Persistence(format!("Failed to serialize state: {}", e))
        })?;

        info!(
            "Saved {} positions to {:?}",
            state.positions.len(),
            self.path
        );
        Ok(())
    }

    /// Load the state file. A missing file, another IOC's file or a
    /// different format version all start fresh.
    pub fn load(&self, ioc: &str) -> Result<Option<PersistedState>, SimError> {
        if !self.path.exists() {
            debug!("State file {:?} does not exist, starting fresh", self.path);
            return Ok(None);
        }

        let file = File::open(&self.path).map_err(|e| {
            SimError::Persistence(format!("Failed to open state file: {}", e))
        })?;
        let state: PersistedState =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
                SimError::Persistence(format!("Failed to deserialize state: {}", e))
            })?;

        if state.version != PersistedState::CURRENT_VERSION {
            warn!(
                "State file version {} differs from current {}, starting fresh",
                state.version,
                PersistedState::CURRENT_VERSION
            );
            return Ok(None);
        }
        if state.ioc != ioc {
            warn!(
                "State file {:?} belongs to IOC '{}', not '{}'; starting fresh",
                self.path, state.ioc, ioc
            );
            return Ok(None);
        }

        info!(
            "Loaded {} positions from {:?} (saved at {})",
            state.positions.len(),
            self.path,
            state.saved_at
        );
        Ok(Some(state))
    }
}
