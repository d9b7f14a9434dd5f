//! simioc Common Library
//!
//! Shared building blocks for the simioc soft-IOC simulator.
//!
//! # Module Structure
//!
//! - [`pv`] - Typed values, metadata, schemas and the in-process value store
//! - [`sim`] - `SimTask` contract, `SimError` and IOC configuration
//! - [`config`] - Configuration loading traits and macro substitution
//! - [`consts`] - Tick rates, routing dimensions and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use simioc_common::prelude::*;
//!
//! let store = MemoryStore::new();
//! store
//!     .register("SIM:HEARTBEAT", PvValue::Int(0), PvMetadata::new())
//!     .unwrap();
//! assert_eq!(store.read_i64("SIM:HEARTBEAT").unwrap(), 0);
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod pv;
pub mod sim;
