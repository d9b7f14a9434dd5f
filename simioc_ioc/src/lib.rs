//! # simioc IOC Library
//!
//! Soft-IOC device simulators and the runtime that schedules them.
//!
//! # Module Structure
//!
//! - [`core`] - IocCore: PV registration, startup hooks, per-task loops
//! - [`ioc_registry`] - IOC factory registration
//! - [`iocs`] - Built-in IOC assemblies
//! - [`devices`] - Simulated devices (motors, BTPS, valves, cameras, ...)
//! - [`state`] - Motor position persistence
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        simioc_ioc                                │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐    │
//! │  │ IocRegistry  │───►│  IocCore     │◄──►│  ValueStore      │    │
//! │  │ (assemblies) │    │ (task loops) │    │ (simioc_common)  │    │
//! │  └──────────────┘    └──────┬───────┘    └──────────────────┘    │
//! │                             │ one thread per task                │
//! │                             ▼                                    │
//! │                    ┌────────────────┐                            │
//! │                    │  SimTask       │ (trait object)             │
//! │                    └────────────────┘                            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod devices;
pub mod ioc_registry;
pub mod iocs;
pub mod state;

pub use crate::core::{IocCore, TaskExit, TaskReport, TimingStats};
pub use crate::ioc_registry::{IocAssembly, IocEntry, IocFactory, IocRegistry};
pub use crate::state::{PersistedState, StatePersistence};
