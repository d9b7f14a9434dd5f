//! AT2L0 attenuator IOC: 19 Beckhoff blade axes under `AT2L0:XTES:`.

use simioc_common::sim::{IocConfig, SimError};

use crate::devices::positioner::BeckhoffAxis;
use crate::ioc_registry::IocAssembly;

/// Number of blades.
pub const NUM_BLADES: u8 = 19;

/// Assemble the attenuator IOC.
pub fn build(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError> {
    let mut assembly = IocAssembly::new();
    for blade in 1..=NUM_BLADES {
        let name = format!("MMS:{blade:02}");
        let axis = BeckhoffAxis::new(format!("{prefix}AT2L0:XTES:{name}"))
            .apply(&config.motor(&name));

        assembly.add_schema(axis.schema());
        assembly.tasks.extend(axis.into_tasks());
    }
    Ok(assembly)
}
