//! Beam Transport Protection System simulation.
//!
//! - [`state`] - Aggregate root: global config, shutters, destinations, cameras
//! - [`destination`] - Per-destination and per-source range checks
//! - [`shutter`] - Shutter safety, current-destination routing, LSS shutters
//! - [`links`] - Motors, cameras, gate valves and their verification
//! - [`task`] - The 1 Hz simulation pass
//!
//! Each tick runs valves, then destinations, then shutters. The shutter
//! pass derives `CurrentDest_RBV` from this tick's in-position flags: `0`
//! when no destination is in position, the index when exactly one is and
//! `-1` when several are.

pub mod destination;
pub mod links;
pub mod shutter;
pub mod state;
pub mod task;

pub use destination::{Centroid, DestinationConfig, SourceConfig, SourceInputs, SourceStatus};
pub use links::{BtpsLinks, BtpsMotorsAndCameras, BtsGateValves, SourceAxes};
pub use shutter::{LssShutter, LssShutters, ShutterSafety, current_destination};
pub use state::{BtpsState, CameraField, CameraStatus, GlobalConfig};
pub use task::BtpsTask;

use simioc_common::pv::PvSchema;

/// Default prefix of the BTPS state tree, below the IOC prefix.
pub const STATE_PREFIX: &str = "LTLHN:BTPS:";

impl BtpsLinks {
    /// Links to the standard BTS devices under `prefix`.
    pub fn standard(prefix: &str, sources: &[u8]) -> Self {
        Self {
            motors: Some(BtpsMotorsAndCameras::new(prefix)),
            valves: Some(BtsGateValves::new(prefix, sources)),
            lss: Some(LssShutters::new(prefix, sources)),
        }
    }

    /// PV schema of the linked valves and LSS shutters. Motors and cameras
    /// are registered by their own tasks' schemas.
    pub fn device_schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        if let Some(valves) = &self.valves {
            for valve in valves.iter() {
                schema.extend(valve.schema());
            }
        }
        if let Some(lss) = &self.lss {
            schema.extend(lss.schema());
        }
        schema
    }
}
