//! Channel-cut monochromator IOC.
//!
//! Device prefixes come from macros, each with the XCS default:
//!
//! | Macro                 | Default          | Device                     |
//! |-----------------------|------------------|----------------------------|
//! | `hutch`               | `XCS`            | energy request             |
//! | `alio_prefix`         | `XCS:MON:MPZ:01` | ALIO piezo (position pair) |
//! | `theta2fine_prefix`   | `XCS:MON:MPZ:02` | theta2 fine (position pair)|
//! | `theta2coarse_prefix` | `XCS:MON:PIC:05` | motor                      |
//! | `chi2_prefix`         | `XCS:MON:PIC:06` | motor                      |
//! | `x_down_prefix`       | `XCS:MON:MMS:24` | IMS motor                  |
//! | `x_up_prefix`         | `XCS:MON:MMS:25` | IMS motor                  |
//! | `y_down_prefix`       | `XCS:MON:MMS:26` | IMS motor                  |
//! | `y_up_north_prefix`   | `XCS:MON:MMS:27` | IMS motor                  |
//! | `y_up_south_prefix`   | `XCS:MON:MMS:28` | IMS motor                  |

use simioc_common::pv::{PvMetadata, PvSchema};
use simioc_common::sim::{IocConfig, SimError};

use super::add_motor;
use crate::devices::motor::{MotorDefaults, MotorKind, MotorRecord};
use crate::ioc_registry::IocAssembly;

/// `(macro, default, kind, velocity)` of each motor record.
const MOTORS: [(&str, &str, MotorKind, f64); 7] = [
    ("theta2coarse", "XCS:MON:PIC:05", MotorKind::Plain, 1.0),
    ("chi2", "XCS:MON:PIC:06", MotorKind::Plain, 1.0),
    ("x_down", "XCS:MON:MMS:24", MotorKind::Ims, 10.0),
    ("x_up", "XCS:MON:MMS:25", MotorKind::Ims, 10.0),
    ("y_down", "XCS:MON:MMS:26", MotorKind::Ims, 1.0),
    ("y_up_north", "XCS:MON:MMS:27", MotorKind::Ims, 1.0),
    ("y_up_south", "XCS:MON:MMS:28", MotorKind::Ims, 1.0),
];

/// `(macro, default)` of the piezo position groups.
const PIEZOS: [(&str, &str); 2] = [
    ("alio", "XCS:MON:MPZ:01"),
    ("theta2fine", "XCS:MON:MPZ:02"),
];

/// Setpoint mirrored straight to a read-only readback.
fn position_pair(prefix: &str) -> PvSchema {
    let mut schema = PvSchema::new();
    schema.pair_named(
        format!("{prefix}:POSITIONSET"),
        format!("{prefix}:POSITIONGET"),
        0.0,
        PvMetadata::new(),
    );
    schema
}

/// Assemble the CCM IOC.
///
/// Motor overrides are keyed by the macro name without `_prefix`
/// (`x_down`, `chi2`, ...).
pub fn build(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError> {
    let macro_or = |key: &str, default: &str| {
        config
            .macros
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };

    let mut assembly = IocAssembly::new();

    let hutch = macro_or("hutch", "XCS");
    let mut request = PvSchema::new();
    request.add(
        format!("{prefix}{hutch}:USER:MCC:EPHOT"),
        0.0,
        PvMetadata::new().units("eV").doc("Requested photon energy"),
    );
    assembly.add_schema(request);

    for (name, default) in PIEZOS {
        let device = macro_or(&format!("{name}_prefix"), default);
        assembly.add_schema(position_pair(&format!("{prefix}{device}")));
    }

    for (name, default, kind, velocity) in MOTORS {
        let device = macro_or(&format!("{name}_prefix"), default);
        let defaults = MotorDefaults::default()
            .with_velocity(velocity)
            .apply(&config.motor(name));
        add_motor(
            &mut assembly,
            MotorRecord::new(format!("{prefix}{device}"), kind),
            defaults,
        );
    }
    Ok(assembly)
}
