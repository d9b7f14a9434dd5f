//! Accelerator IOC: HXU and SXU beam parameters plus a heartbeat.

use simioc_common::sim::{IocConfig, SimError};

use crate::devices::heartbeat::Heartbeat;
use crate::devices::undulator::{BeamParameters, UndulatorParams};
use crate::ioc_registry::IocAssembly;

/// Assemble the accelerator IOC.
pub fn build(prefix: &str, _config: &IocConfig) -> Result<IocAssembly, SimError> {
    let mut assembly = IocAssembly::new();
    for (line, params) in [("hxu", UndulatorParams::HXU), ("sxu", UndulatorParams::SXU)] {
        let heartbeat = Heartbeat::new(format!("{prefix}{line}:"));
        let beam = BeamParameters::new(format!("{prefix}{line}:"), params);
        assembly
            .add_schema(heartbeat.schema())
            .add_schema(beam.schema())
            .add_task(heartbeat)
            .add_task(beam);
    }
    Ok(assembly)
}
