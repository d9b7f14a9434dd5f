//! Prelude module for common re-exports.
//!
//! ```rust
//! use simioc_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::sim::config::{IocConfig, MotorConfig};

// ─── Value store ────────────────────────────────────────────────────
pub use crate::pv::{
    MemoryStore, PvError, PvKind, PvMetadata, PvSchema, PvValue, ValueStore,
};

// ─── Tasks ──────────────────────────────────────────────────────────
pub use crate::sim::task::{SimError, SimTask, StartupHook};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{LASER_SOURCES, NUM_DESTINATIONS};
