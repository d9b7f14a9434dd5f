//! Split-and-delay IOC: the Aerotech stages of the four delay towers and
//! the diagnostics.

use simioc_common::sim::{IocConfig, SimError};

use super::add_motor;
use crate::devices::motor::{MotorDefaults, MotorKind, MotorRecord};
use crate::ioc_registry::IocAssembly;

const VELOCITY: f64 = 3.0;
const PRECISION: u16 = 2;

/// Stage suffixes below the IOC prefix.
const STAGES: [&str; 22] = [
    ":T1:TTH", ":T1:TH1", ":T1:TH2", ":T1:X", ":T1:L",
    ":T4:TTH", ":T4:TH1", ":T4:TH2", ":T4:X", ":T4:L",
    ":T2:TH", ":T2:X",
    ":T3:TH", ":T3:X",
    ":DIA:DI:X", ":DIA:DD:X", ":DIA:DD:Y", ":DIA:DO:X",
    ":DIA:DCI:X", ":DIA:DCC:X", ":DIA:DCC:Y", ":DIA:DCO:X",
];

/// Assemble the split-and-delay IOC.
///
/// Motor overrides are keyed by the stage suffix without its leading colon
/// (`T1:TTH`, `DIA:DCC:Y`, ...).
pub fn build(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError> {
    let mut assembly = IocAssembly::new();
    for stage in STAGES {
        let defaults = MotorDefaults::default()
            .with_velocity(VELOCITY)
            .with_precision(PRECISION)
            .apply(&config.motor(stage.trim_start_matches(':')));
        add_motor(
            &mut assembly,
            MotorRecord::new(format!("{prefix}{stage}"), MotorKind::Aerotech),
            defaults,
        );
    }
    Ok(assembly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_is_an_aerotech_axis() {
        let assembly = build("PREFIX", &IocConfig::default()).unwrap();
        assert_eq!(assembly.tasks.len(), STAGES.len());
        assert!(assembly.schema.contains("PREFIX:T1:TTH.RBV"));
        assert!(assembly.schema.contains("PREFIX:T1:TTH:AXIS_FAULT"));
        assert!(assembly.schema.contains("PREFIX:DIA:DCO:X:ZERO_P"));
    }
}
