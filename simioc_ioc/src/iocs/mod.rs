//! Built-in IOC assemblies.
//!
//! | Name        | Default prefix | Contents                                      |
//! |-------------|----------------|-----------------------------------------------|
//! | `motor`     | `sim:`         | three plain and three XPS motor records        |
//! | `btps`      | `SIM:`         | BTS motors, cameras, gate valves, LSS, BTPS    |
//! | `heartbeat` | `sim:`         | heartbeat signal                               |
//! | `qmini`     | `IOC:TST:`     | Qmini, scan motor and spectrum playback        |
//! | `at2l0`     | `sim:`         | 19 Beckhoff attenuator blade axes              |
//! | `energy`    | `PREFIX:`      | HXU/SXU beam parameters and heartbeat          |
//! | `ccm`       | `sim:`         | CCM motors, piezo positions, energy request    |
//! | `snd`       | `PREFIX`       | split-and-delay Aerotech stages                |

pub mod at2l0;
pub mod btps;
pub mod ccm;
pub mod energy;
pub mod heartbeat;
pub mod motor;
pub mod qmini;
pub mod split_and_delay;

use crate::devices::motor::{MotorDefaults, MotorRecord, MotorTask};
use crate::ioc_registry::{IocAssembly, IocEntry, IocRegistry};

/// Register every built-in IOC.
pub fn register_all(registry: &mut IocRegistry) {
    registry.register(
        "motor",
        IocEntry {
            factory: motor::build,
            default_prefix: "sim:",
            description: "A fake motor IOC, with 3 plain and 3 XPS motors",
        },
    );
    registry.register(
        "btps",
        IocEntry {
            factory: btps::build,
            default_prefix: "SIM:",
            description: "BTPS motors, cameras, valves and range logic",
        },
    );
    registry.register(
        "heartbeat",
        IocEntry {
            factory: heartbeat::build,
            default_prefix: "sim:",
            description: "Heartbeat signal with a configurable beat pattern",
        },
    );
    registry.register(
        "qmini",
        IocEntry {
            factory: qmini::build,
            default_prefix: "IOC:TST:",
            description: "Qmini spectrometer, scan motor and spectrum playback",
        },
    );
    registry.register(
        "at2l0",
        IocEntry {
            factory: at2l0::build,
            default_prefix: "sim:",
            description: "AT2L0 attenuator blade motion",
        },
    );
    registry.register(
        "energy",
        IocEntry {
            factory: energy::build,
            default_prefix: "PREFIX:",
            description: "Accelerator beam parameters for PMPS",
        },
    );
    registry.register(
        "ccm",
        IocEntry {
            factory: ccm::build,
            default_prefix: "sim:",
            description: "A simulated CCM IOC",
        },
    );
    registry.register(
        "snd",
        IocEntry {
            factory: split_and_delay::build,
            default_prefix: "PREFIX",
            description: "A stand-in split and delay IOC with Aerotech stages",
        },
    );
}

/// Add a motor record's PVs and its task.
pub(crate) fn add_motor(assembly: &mut IocAssembly, record: MotorRecord, defaults: MotorDefaults) {
    assembly.add_schema(record.schema(&defaults));
    assembly.add_task(MotorTask::new(record, defaults));
}
