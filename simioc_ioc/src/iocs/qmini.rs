//! Dispersion-scan IOC: a Qmini, the motor it scans with and spectrum
//! playback that follows the motor.
//!
//! Device names come from the `spectrometer` and `motor` macros. The
//! spectra come from `[dscan] dataset` or, when unset, a synthetic set.

use simioc_common::sim::{IocConfig, SimError};

use super::add_motor;
use crate::devices::dscan::{DscanTask, SpectrumDataset};
use crate::devices::motor::{MotorDefaults, MotorKind, MotorRecord};
use crate::devices::spectrometer::Qmini;
use crate::ioc_registry::IocAssembly;

const DEFAULT_SPECTROMETER: &str = "DScan:Qmini";
const DEFAULT_MOTOR: &str = "DScan:m1";

/// Assemble the spectrometer IOC.
pub fn build(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError> {
    let macro_or = |key: &str, default: &str| {
        config
            .macros
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };
    let spectrometer = format!("{prefix}{}", macro_or("spectrometer", DEFAULT_SPECTROMETER));
    let motor = macro_or("motor", DEFAULT_MOTOR);

    let dataset = match &config.dscan.dataset {
        Some(path) => SpectrumDataset::from_npz(path)?,
        None => SpectrumDataset::synthetic(),
    };

    let qmini = Qmini::new(spectrometer.clone());
    let mut assembly = IocAssembly::new();
    assembly.add_schema(qmini.schema()).add_task(qmini);

    let record = MotorRecord::new(format!("{prefix}{motor}"), MotorKind::Plain);
    let mut scan = DscanTask::new(prefix, spectrometer, record.rbv(), dataset);
    if let Some(noise) = config.dscan.noise_level {
        scan = scan.with_noise_level(noise);
    }
    assembly.add_schema(scan.schema()).add_task(scan);

    let defaults = MotorDefaults::default()
        .with_velocity(100.0)
        .apply(&config.motor(&motor));
    add_motor(&mut assembly, record, defaults);
    Ok(assembly)
}
