//! Simulation task trait and error types.
//!
//! This module defines:
//! - `SimTask` trait - Interface for periodic simulation tasks
//! - `SimError` enum - Error types for simulation operations
//! - `StartupHook` type alias - One-shot startup callbacks

use crate::config::ConfigError;
use crate::pv::{PvError, ValueStore};
use std::time::Duration;
use thiserror::Error;

/// Error types for simulation operations.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    /// Required collaborator or setting missing. Halts the task.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Value store operation failed
    #[error("PV error: {0}")]
    Pv(#[from] PvError),

    /// State persistence error
    #[error("State persistence error: {0}")]
    Persistence(String),

    /// Task or IOC initialization failed. Halts the task.
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// No IOC registered under this name
    #[error("IOC not found: {0}")]
    IocNotFound(String),
}

impl SimError {
    /// Fatal errors stop the task that raised them; others are logged and
    /// the task keeps ticking.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimError::Configuration(_) | SimError::InitFailed(_))
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Configuration(e.to_string())
    }
}

/// One-shot callback run against the store after registration and before
/// any periodic task starts.
pub type StartupHook = Box<dyn FnOnce(&dyn ValueStore) -> Result<(), SimError> + Send>;

/// A periodic simulation task.
///
/// The scheduler runs each task on its own thread.
///
/// # Lifecycle
///
/// 1. `restore()` - Called with a persisted position, if one exists
/// 2. `startup()` - Called once on the task thread before the first tick
/// 3. `tick()` - Called every `period()` until the running flag clears
/// 4. `shutdown()` - Called once when the loop exits
///
/// A `tick()` error for which [`SimError::is_fatal`] holds ends the loop;
/// any other error is logged and the next tick proceeds.
pub trait SimTask: Send {
    /// Unique task name (normally the device PV prefix).
    fn name(&self) -> &str;

    /// Tick period.
    fn period(&self) -> Duration;

    /// Prepare the task's PVs.
    fn startup(&mut self, _store: &dyn ValueStore) -> Result<(), SimError> {
        Ok(())
    }

    /// Execute one simulation step.
    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError>;

    /// Release resources after the loop ends.
    fn shutdown(&mut self, _store: &dyn ValueStore) -> Result<(), SimError> {
        Ok(())
    }

    /// Key under which this task's position is persisted. `None` opts out.
    fn state_key(&self) -> Option<&str> {
        None
    }

    /// Position to persist at shutdown.
    fn snapshot_position(&self, _store: &dyn ValueStore) -> Option<f64> {
        None
    }

    /// Restore a persisted position before startup.
    fn restore_position(&mut self, _store: &dyn ValueStore, _position: f64) -> Result<(), SimError> {
        Ok(())
    }
}
