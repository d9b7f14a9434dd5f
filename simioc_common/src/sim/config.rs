//! IOC configuration loaded from `ioc.toml`.
//!
//! Every field is optional so a process can run from CLI flags alone.
//!
//! # TOML Example
//!
//! ```toml
//! ioc = "btps"
//! prefix = "{area}:SIM:"
//! state_file = "/tmp/simioc-btps.state"
//!
//! [shared]
//! service_name = "simioc-btps"
//!
//! [macros]
//! area = "LAS"
//!
//! [motors.m7]
//! position = 405.0
//! velocity = 10.0
//!
//! [[btps.nominal]]
//! destination = 2
//! source = 1
//! linear = 405.0
//! tolerance = 0.5
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{ConfigError, SharedConfig, expand_macros};
use crate::consts::{LASER_SOURCES, NUM_DESTINATIONS};

/// Default true helper
fn default_true() -> bool {
    true
}

/// Top-level IOC configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IocConfig {
    /// Common fields.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Name of the IOC assembly to run.
    #[serde(default)]
    pub ioc: Option<String>,

    /// PV prefix; may contain `{macro}` references.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Macro values for prefix substitution.
    #[serde(default)]
    pub macros: BTreeMap<String, String>,

    /// File for motor position persistence.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Per-motor overrides, keyed by the motor's short name.
    #[serde(default)]
    pub motors: BTreeMap<String, MotorConfig>,

    /// BTPS specific settings.
    #[serde(default)]
    pub btps: BtpsConfig,

    /// Dispersion-scan spectrum playback settings.
    #[serde(default)]
    pub dscan: DscanConfig,
}

impl IocConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared` is valid
    /// 2. Motor velocities and resolutions are positive
    /// 3. BTPS seeds reference existing destinations and sources
    /// 4. The dscan noise level is non-negative
    /// 5. The prefix expands with the given macros
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        for (name, motor) in &self.motors {
            motor.validate(name)?;
        }

        self.btps.validate()?;
        self.dscan.validate()?;

        if let Some(prefix) = &self.prefix {
            expand_macros(prefix, &self.macros)?;
        }
        Ok(())
    }

    /// The PV prefix after macro expansion, or `default` if none is set.
    pub fn resolve_prefix(&self, default: &str) -> Result<String, ConfigError> {
        let template = self.prefix.as_deref().unwrap_or(default);
        expand_macros(template, &self.macros)
    }

    /// Overrides for motor `name`, or empty overrides.
    pub fn motor(&self, name: &str) -> MotorConfig {
        self.motors.get(name).cloned().unwrap_or_default()
    }
}

/// Overrides for a simulated motor. Unset fields keep the IOC defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Initial position.
    #[serde(default)]
    pub position: Option<f64>,
    /// Velocity in EGU per second.
    #[serde(default)]
    pub velocity: Option<f64>,
    /// Display precision.
    #[serde(default)]
    pub precision: Option<u16>,
    /// Seconds to reach velocity.
    #[serde(default)]
    pub acceleration: Option<f64>,
    /// Motor resolution (EGU per step).
    #[serde(default)]
    pub resolution: Option<f64>,
    /// `[low, high]` user limits.
    #[serde(default)]
    pub user_limits: Option<[f64; 2]>,
    /// Engineering units.
    #[serde(default)]
    pub egu: Option<String>,
}

impl MotorConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if let Some(v) = self.velocity {
            if !(v.is_finite() && v > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "motor {name}: velocity must be positive, got {v}"
                )));
            }
        }
        if let Some(r) = self.resolution {
            if !(r.is_finite() && r > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "motor {name}: resolution must be positive, got {r}"
                )));
            }
        }
        Ok(())
    }
}

/// BTPS IOC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BtpsConfig {
    /// Initial `SimEnable` value.
    #[serde(default = "default_true")]
    pub sim_enable: bool,

    /// Open and pump down all BTS gate valves at startup.
    #[serde(default = "default_true")]
    pub seed_valves: bool,

    /// Nominal positions to seed at startup.
    #[serde(default)]
    pub nominal: Vec<NominalSeed>,

    /// Destinations that expose a `YieldsControl` pair.
    #[serde(default)]
    pub yield_control: Vec<u8>,
}

impl Default for BtpsConfig {
    fn default() -> Self {
        Self {
            sim_enable: true,
            seed_valves: true,
            nominal: Vec::new(),
            yield_control: Vec::new(),
        }
    }
}

impl BtpsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for seed in &self.nominal {
            check_destination(seed.destination)?;
            if !LASER_SOURCES.contains(&seed.source) {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown laser source {} (expected one of {:?})",
                    seed.source, LASER_SOURCES
                )));
            }
            if let Some(tol) = seed.tolerance {
                if !(tol.is_finite() && tol >= 0.0) {
                    return Err(ConfigError::ValidationError(format!(
                        "Tolerance must be non-negative, got {tol}"
                    )));
                }
            }
        }
        for dest in &self.yield_control {
            check_destination(*dest)?;
        }
        Ok(())
    }
}

/// Spectrum playback for the `qmini` IOC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DscanConfig {
    /// `.npz` archive with `positions` (m), `wavelengths` (m) and
    /// `intensities` (positions x wavelengths). A synthetic dataset is used
    /// when unset.
    #[serde(default)]
    pub dataset: Option<PathBuf>,

    /// Initial `DScan:NoiseLevel`.
    #[serde(default)]
    pub noise_level: Option<f64>,
}

impl DscanConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(noise) = self.noise_level {
            if !(noise.is_finite() && noise >= 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "dscan: noise_level must be non-negative, got {noise}"
                )));
            }
        }
        Ok(())
    }
}

fn check_destination(dest: u8) -> Result<(), ConfigError> {
    if dest == 0 || usize::from(dest) > NUM_DESTINATIONS {
        return Err(ConfigError::ValidationError(format!(
            "Destination {dest} out of range 1..={NUM_DESTINATIONS}"
        )));
    }
    Ok(())
}

/// Nominal range seeding for one (destination, source) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NominalSeed {
    /// Destination index (1-based).
    pub destination: u8,
    /// Laser source index.
    pub source: u8,
    /// Linear stage nominal.
    #[serde(default)]
    pub linear: Option<f64>,
    /// Rotary stage nominal.
    #[serde(default)]
    pub rotary: Option<f64>,
    /// Goniometer nominal.
    #[serde(default)]
    pub goniometer: Option<f64>,
    /// Half-width of the range; defaults to the standard tolerance.
    #[serde(default)]
    pub tolerance: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_gives_defaults() {
        let config: IocConfig = toml::from_str("").unwrap();
        assert!(config.ioc.is_none());
        assert!(config.btps.sim_enable);
        assert!(config.btps.seed_valves);
        assert_eq!(config.shared.service_name, "simioc");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_full_example() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"ioc = "btps"
prefix = "{{area}}:SIM:"
state_file = "/tmp/btps.state"

[shared]
log_level = "debug"
service_name = "simioc-btps"

[macros]
area = "LAS"

[motors.m7]
position = 405.0
user_limits = [400.0, 1446.53]

[btps]
sim_enable = false
yield_control = [3]

[[btps.nominal]]
destination = 2
source = 1
linear = 405.0
tolerance = 0.5
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = IocConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ioc.as_deref(), Some("btps"));
        assert_eq!(config.resolve_prefix("SIM:").unwrap(), "LAS:SIM:");
        assert_eq!(config.motor("m7").position, Some(405.0));
        assert_eq!(config.motor("m7").user_limits, Some([400.0, 1446.53]));
        assert_eq!(config.motor("m1"), MotorConfig::default());
        assert!(!config.btps.sim_enable);
        assert_eq!(config.btps.nominal[0].tolerance, Some(0.5));
    }

    #[test]
    fn rejects_bad_motor_velocity() {
        let mut config = IocConfig::default();
        config.motors.insert(
            "mtr1".to_string(),
            MotorConfig {
                velocity: Some(0.0),
                ..Default::default()
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_unknown_source_and_destination() {
        let seed = NominalSeed {
            destination: 1,
            source: 3,
            linear: Some(1.0),
            rotary: None,
            goniometer: None,
            tolerance: None,
        };
        let mut config = IocConfig::default();
        config.btps.nominal.push(seed.clone());
        assert!(config.validate().is_err());

        let mut config = IocConfig::default();
        config.btps.nominal.push(NominalSeed {
            destination: 15,
            source: 1,
            ..seed
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn dscan_section_is_optional_and_checked() {
        let config: IocConfig = toml::from_str(
            r#"
[dscan]
dataset = "dscan_sample.npz"
"#,
        )
        .unwrap();
        assert_eq!(config.dscan.dataset, Some(PathBuf::from("dscan_sample.npz")));
        assert!(config.validate().is_ok());

        let config = IocConfig {
            dscan: DscanConfig {
                noise_level: Some(-1.0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_prefix_falls_back_to_default() {
        let config = IocConfig::default();
        assert_eq!(config.resolve_prefix("sim:").unwrap(), "sim:");

        let config = IocConfig {
            prefix: Some("{missing}".to_string()),
            ..Default::default()
        };
        assert!(config.resolve_prefix("sim:").is_err());
        assert!(config.validate().is_err());
    }
}
