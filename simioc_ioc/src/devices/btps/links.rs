//! Collaborators of the BTPS state: motors, cameras, gate valves and LSS
//! shutters.
//!
//! [`BtpsLinks`] is handed to the BTPS task at construction. Every link is
//! optional so that a partially wired IOC can be built; [`BtpsLinks::verify`]
//! turns a missing link, or a linked device whose PVs are absent from the
//! store, into a configuration error.

use simioc_common::consts::NUM_DESTINATIONS;
use simioc_common::pv::ValueStore;
use simioc_common::sim::SimError;

use super::shutter::LssShutters;
use crate::devices::camera::StatsPlugin;
use crate::devices::motor::{MotorDefaults, MotorKind, MotorRecord};
use crate::devices::valve::GateValve;

/// Motors and cameras serving one laser source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAxes {
    /// Laser source number.
    pub source: u8,
    /// Linear stage motor.
    pub linear: MotorRecord,
    /// Rotary stage motor.
    pub rotary: MotorRecord,
    /// Goniometer motor.
    pub goniometer: MotorRecord,
    /// Near-field camera stats.
    pub near_field: StatsPlugin,
    /// Far-field camera stats.
    pub far_field: StatsPlugin,
}

/// Short motor names `(linear, rotary, goniometer)` and camera bay per source.
const SOURCE_WIRING: [(u8, [&str; 3], u8); 3] = [
    (1, ["m1", "m2", "m3"], 1),
    (5, ["m4", "m6", "m5"], 3),
    (8, ["m7", "m8", "m9"], 4),
];

/// Motor name, initial position and user limits.
const MOTORS: [(&str, f64, (f64, f64)); 9] = [
    ("m1", 0.0, (0.0, 0.0)),
    ("m2", 0.0, (0.0, 0.0)),
    ("m3", 0.0, (0.0, 0.0)),
    ("m4", 0.0, (0.0, 2000.0)),
    ("m5", 0.0, (0.0, 0.0)),
    ("m6", 0.0, (-95.0, 95.0)),
    ("m7", 405.0, (400.0, 1446.53)),
    ("m8", 0.0, (-300.0, 300.0)),
    ("m9", 0.0, (0.0, 0.0)),
];

/// The BTS motion controller axes and the LHN bay cameras.
#[derive(Debug, Clone, PartialEq)]
pub struct BtpsMotorsAndCameras {
    motors: Vec<(&'static str, MotorRecord, MotorDefaults)>,
    sources: Vec<SourceAxes>,
}

impl BtpsMotorsAndCameras {
    /// Devices under `prefix`.
    pub fn new(prefix: &str) -> Self {
        let record = |name: &str| MotorRecord::new(format!("{prefix}LAS:BTS:MCS2:01:{name}"), MotorKind::Plain);

        let motors = MOTORS
            .iter()
            .map(|(name, position, (low, high))| {
                let defaults = MotorDefaults::default().at(*position).with_limits(*low, *high);
                (*name, record(*name), defaults)
            })
            .collect();

        let sources = SOURCE_WIRING
            .iter()
            .map(|(source, [linear, rotary, goniometer], bay)| {
                let camera = |n: u8| StatsPlugin::new(format!("{prefix}LAS:LHN:BAY{bay}:CAM:{n:02}:Stats2:"));
                SourceAxes {
                    source: *source,
                    linear: record(*linear),
                    rotary: record(*rotary),
                    goniometer: record(*goniometer),
                    near_field: camera(1),
                    far_field: camera(2),
                }
            })
            .collect();

        Self { motors, sources }
    }

    /// `(short name, record, defaults)` of every motor.
    pub fn motors(&self) -> &[(&'static str, MotorRecord, MotorDefaults)] {
        &self.motors
    }

    /// Axes of `source`.
    pub fn source(&self, source: u8) -> Option<&SourceAxes> {
        self.sources.iter().find(|s| s.source == source)
    }

    /// Every camera, near field first.
    pub fn cameras(&self) -> impl Iterator<Item = &StatsPlugin> {
        self.sources
            .iter()
            .map(|s| &s.near_field)
            .chain(self.sources.iter().map(|s| &s.far_field))
    }

    fn required_pvs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.motors.iter().map(|(_, m, _)| m.rbv()).collect();
        for camera in self.cameras() {
            names.push(camera.array_counter());
            names.push(camera.centroid_x());
            names.push(camera.centroid_y());
        }
        names
    }
}

/// Source and destination gate valves of the BTS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtsGateValves {
    sources: Vec<(u8, GateValve)>,
    destinations: Vec<(u8, GateValve)>,
}

impl BtsGateValves {
    /// `LTLHN:LS{n}:VGC:01` per source and `LTLHN:LD{n}:VGC:01` per
    /// destination.
    pub fn new(prefix: &str, sources: &[u8]) -> Self {
        Self {
            sources: sources
                .iter()
                .map(|s| (*s, GateValve::new(format!("{prefix}LTLHN:LS{s}:VGC:01"))))
                .collect(),
            destinations: (1..=NUM_DESTINATIONS)
                .filter_map(|d| u8::try_from(d).ok())
                .map(|d| (d, GateValve::new(format!("{prefix}LTLHN:LD{d}:VGC:01"))))
                .collect(),
        }
    }

    /// Entry valve of `source`.
    pub fn source(&self, source: u8) -> Option<&GateValve> {
        self.sources.iter().find(|(s, _)| *s == source).map(|(_, v)| v)
    }

    /// Exit valve of `destination`.
    pub fn destination(&self, destination: u8) -> Option<&GateValve> {
        self.destinations
            .iter()
            .find(|(d, _)| *d == destination)
            .map(|(_, v)| v)
    }

    /// Every valve, sources first.
    pub fn iter(&self) -> impl Iterator<Item = &GateValve> {
        self.sources
            .iter()
            .chain(self.destinations.iter())
            .map(|(_, v)| v)
    }
}

/// Everything the BTPS state reads besides its own PVs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BtpsLinks {
    /// Motion axes and cameras.
    pub motors: Option<BtpsMotorsAndCameras>,
    /// Gate valves.
    pub valves: Option<BtsGateValves>,
    /// LSS shutters.
    pub lss: Option<LssShutters>,
}

impl BtpsLinks {
    /// Check every link is present and every PV it needs is registered.
    pub fn verify(&self, store: &dyn ValueStore, sources: &[u8]) -> Result<(), SimError> {
        let motors = self.motors.as_ref().ok_or_else(|| missing("motors"))?;
        let valves = self.valves.as_ref().ok_or_else(|| missing("gate valves"))?;
        let lss = self.lss.as_ref().ok_or_else(|| missing("LSS shutters"))?;

        for source in sources {
            if motors.source(*source).is_none() {
                return Err(SimError::Configuration(format!(
                    "No motors wired for laser source {source}"
                )));
            }
            if valves.source(*source).is_none() {
                return Err(SimError::Configuration(format!(
                    "No gate valve wired for laser source {source}"
                )));
            }
            if lss.get(*source).is_none() {
                return Err(SimError::Configuration(format!(
                    "No LSS shutter wired for laser source {source}"
                )));
            }
        }

        let names = motors
            .required_pvs()
            .into_iter()
            .chain(valves.iter().flat_map(|v| v.required_pvs()))
            .chain(lss.iter().flat_map(|s| s.required_pvs()));

        for name in names {
            if !store.contains(&name) {
                return Err(SimError::Configuration(format!(
                    "BTPS collaborator PV {name} is not registered"
                )));
            }
        }
        Ok(())
    }
}

fn missing(what: &str) -> SimError {
    SimError::Configuration(format!(
        "BTPS simulation requires {what}; include them in the IOC"
    ))
}
