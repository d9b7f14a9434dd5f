//! Heartbeat IOC.

use simioc_common::sim::{IocConfig, SimError};

use crate::devices::heartbeat::Heartbeat;
use crate::ioc_registry::IocAssembly;

/// Assemble the heartbeat IOC.
pub fn build(prefix: &str, _config: &IocConfig) -> Result<IocAssembly, SimError> {
    let heartbeat = Heartbeat::new(prefix);
    let mut assembly = IocAssembly::new();
    assembly.add_schema(heartbeat.schema()).add_task(heartbeat);
    Ok(assembly)
}
