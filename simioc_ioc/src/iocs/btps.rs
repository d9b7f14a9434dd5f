//! BTPS simulator IOC: BTS motors and cameras, gate valves, LSS shutters
//! and the BTPS state tree under `LTLHN:BTPS:`.

use simioc_common::consts::{LASER_SOURCES, NUM_DESTINATIONS};
use simioc_common::pv::{PvMetadata, PvSchema};
use simioc_common::sim::{IocConfig, SimError};

use super::add_motor;
use crate::devices::btps::{BtpsLinks, BtpsState, BtpsTask, STATE_PREFIX};
use crate::devices::camera::StatsPluginTask;
use crate::ioc_registry::IocAssembly;

/// Assemble the BTPS IOC.
pub fn build(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError> {
    let mut assembly = IocAssembly::new();
    let links = BtpsLinks::standard(prefix, &LASER_SOURCES);

    if let Some(devices) = &links.motors {
        for (name, record, defaults) in devices.motors() {
            add_motor(
                &mut assembly,
                record.clone(),
                defaults.clone().apply(&config.motor(name)),
            );
        }
        for plugin in devices.cameras() {
            assembly
                .add_schema(plugin.schema())
                .add_task(StatsPluginTask::new(plugin.clone()));
        }
    }
    assembly.add_schema(links.device_schema());

    let state_prefix = format!("{prefix}{STATE_PREFIX}");
    let state = BtpsState::new(
        &state_prefix,
        NUM_DESTINATIONS,
        &LASER_SOURCES,
        &config.btps.yield_control,
    );

    let mut sim = PvSchema::new();
    sim.add(
        state.load_config_pv(),
        0,
        PvMetadata::new().doc("Write to re-apply the configured nominal ranges"),
    );
    assembly.add_schema(state.schema()).add_schema(sim);
    assembly.add_task(BtpsTask::new(
        state,
        links,
        &LASER_SOURCES,
        config.btps.clone(),
    ));
    Ok(assembly)
}
