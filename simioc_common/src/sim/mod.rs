//! Simulation task contract and IOC configuration.

pub mod config;
pub mod task;

pub use config::{BtpsConfig, DscanConfig, IocConfig, MotorConfig, NominalSeed};
pub use task::{SimError, SimTask, StartupHook};
