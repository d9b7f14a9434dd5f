//! Motor IOC: `mtr1..3` and `xps:mtr1..3`.

use simioc_common::sim::{IocConfig, SimError};

use super::add_motor;
use crate::devices::motor::{MotorDefaults, MotorKind, MotorRecord};
use crate::ioc_registry::IocAssembly;

/// `(name, kind, velocity, precision)`.
const MOTORS: [(&str, MotorKind, f64, u16); 6] = [
    ("mtr1", MotorKind::Plain, 1.0, 3),
    ("mtr2", MotorKind::Plain, 2.0, 2),
    ("mtr3", MotorKind::Plain, 3.0, 2),
    ("xps:mtr1", MotorKind::Xps, 3.0, 2),
    ("xps:mtr2", MotorKind::Xps, 3.0, 2),
    ("xps:mtr3", MotorKind::Xps, 3.0, 2),
];

/// Assemble the motor IOC.
pub fn build(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError> {
    let mut assembly = IocAssembly::new();
    for (name, kind, velocity, precision) in MOTORS {
        let defaults = MotorDefaults::default()
            .with_velocity(velocity)
            .with_precision(precision)
            .apply(&config.motor(name));
        add_motor(
            &mut assembly,
            MotorRecord::new(format!("{prefix}{name}"), kind),
            defaults,
        );
    }
    Ok(assembly)
}
