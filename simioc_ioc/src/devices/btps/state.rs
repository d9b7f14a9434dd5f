//! BTPS aggregate root: global configuration, shutters, destinations and
//! camera status.

use simioc_common::pv::{PvMetadata, PvSchema, PvValue, RBV_SUFFIX, ValueStore};
use simioc_common::sim::SimError;

use super::destination::DestinationConfig;
use super::shutter::ShutterSafety;

/// Global BTPS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    prefix: String,
}

impl GlobalConfig {
    fn new(state_prefix: &str) -> Self {
        Self {
            prefix: format!("{state_prefix}Config:"),
        }
    }

    /// `MaxFrameTime` setpoint.
    pub fn max_frame_time_pv(&self) -> String {
        format!("{}MaxFrameTime", self.prefix)
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .pair(
                format!("{}SystemOverride", self.prefix),
                0.0,
                PvMetadata::new().doc("System override for when BTPS gets in the way"),
            )
            .pair(
                self.max_frame_time_pv(),
                0.0,
                PvMetadata::new()
                    .units("s")
                    .doc("Maximum time between frame updates to be considered valid data"),
            )
            .pair(
                format!("{}MinPixelChange", self.prefix),
                0.0,
                PvMetadata::new().doc("Minimal change in camera image sum to be considered valid"),
            );
        schema
    }

    /// Configured maximum frame time in seconds; non-positive means unset.
    pub fn max_frame_time(&self, store: &dyn ValueStore) -> Result<f64, SimError> {
        Ok(store.read_f64(&format!("{}{RBV_SUFFIX}", self.max_frame_time_pv()))?)
    }
}

/// Near- or far-field camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraField {
    /// Near field.
    Near,
    /// Far field.
    Far,
}

impl CameraField {
    /// `NF` or `FF`.
    pub fn tag(&self) -> &'static str {
        match self {
            CameraField::Near => "NF",
            CameraField::Far => "FF",
        }
    }
}

/// PLC-side frame checks of one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraStatus {
    source: u8,
    field: CameraField,
    prefix: String,
}

impl CameraStatus {
    fn new(state_prefix: &str, field: CameraField, source: u8) -> Self {
        Self {
            source,
            field,
            prefix: format!("{state_prefix}Chk:{}{source}:", field.tag()),
        }
    }

    /// Laser source number.
    pub fn source(&self) -> u8 {
        self.source
    }

    /// Which camera of the source.
    pub fn field(&self) -> CameraField {
        self.field
    }

    /// `FrameTime_RBV`.
    pub fn frame_time_pv(&self) -> String {
        format!("{}FrameTime_RBV", self.prefix)
    }

    /// `IsUpdating_RBV`.
    pub fn is_updating_pv(&self) -> String {
        format!("{}IsUpdating_RBV", self.prefix)
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .add(
                self.frame_time_pv(),
                0.0,
                PvMetadata::new()
                    .read_only()
                    .precision(3)
                    .units("s")
                    .doc("Frame time as calculated by the PLC"),
            )
            .add(
                self.is_updating_pv(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["FALSE", "TRUE"])
                    .read_only()
                    .doc("Camera is producing frames"),
            );
        schema
    }

    /// Publish a frame check result.
    pub fn publish(&self, store: &dyn ValueStore, frame_time: f64, updating: bool) -> Result<(), SimError> {
        store.update_if_differs(&self.frame_time_pv(), PvValue::Double(frame_time))?;
        store.update_if_differs(&self.is_updating_pv(), PvValue::from(updating))?;
        Ok(())
    }
}

/// Beam Transport Protection System state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtpsState {
    prefix: String,
    /// Global settings.
    pub config: GlobalConfig,
    shutters: Vec<ShutterSafety>,
    destinations: Vec<DestinationConfig>,
    cameras: Vec<CameraStatus>,
}

impl BtpsState {
    /// State under `prefix` with `num_destinations` destinations (indexed
    /// from 1) and one shutter per source.
    pub fn new(prefix: &str, num_destinations: usize, sources: &[u8], yield_control: &[u8]) -> Self {
        let destinations = (1..=num_destinations)
            .filter_map(|idx| u8::try_from(idx).ok())
            .map(|idx| DestinationConfig::new(prefix, idx, sources, yield_control.contains(&idx)))
            .collect();

        let cameras = [CameraField::Near, CameraField::Far]
            .into_iter()
            .flat_map(|field| sources.iter().map(move |s| CameraStatus::new(prefix, field, *s)))
            .collect();

        Self {
            prefix: prefix.to_string(),
            config: GlobalConfig::new(prefix),
            shutters: sources.iter().map(|s| ShutterSafety::new(prefix, *s)).collect(),
            destinations,
            cameras,
        }
    }

    /// State prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `SimEnable`.
    pub fn sim_enable_pv(&self) -> String {
        format!("{}SimEnable", self.prefix)
    }

    /// `Sim:LoadConfig`: a write re-applies the configured nominal ranges.
    pub fn load_config_pv(&self) -> String {
        format!("{}Sim:LoadConfig", self.prefix)
    }

    /// Is recomputation enabled?
    pub fn sim_enabled(&self, store: &dyn ValueStore) -> Result<bool, SimError> {
        Ok(store.read_bool(&self.sim_enable_pv())?)
    }

    /// Source shutters.
    pub fn shutters(&self) -> &[ShutterSafety] {
        &self.shutters
    }

    /// Shutter of `source`.
    pub fn shutter(&self, source: u8) -> Option<&ShutterSafety> {
        self.shutters.iter().find(|s| s.source() == source)
    }

    /// All destinations, in index order.
    pub fn destinations(&self) -> &[DestinationConfig] {
        &self.destinations
    }

    /// Destination by 1-based index.
    pub fn destination(&self, index: u8) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|d| d.index() == index)
    }

    /// Camera status blocks.
    pub fn cameras(&self) -> &[CameraStatus] {
        &self.cameras
    }

    /// PV schema of the whole state tree.
    pub fn schema(&self) -> PvSchema {
        let mut schema = self.config.schema();
        for shutter in &self.shutters {
            schema.extend(shutter.schema());
        }
        for dest in &self.destinations {
            schema.extend(dest.schema());
        }
        schema.add(
            self.sim_enable_pv(),
            1,
            PvMetadata::new().doc("Enable the BTPS simulation pass"),
        );
        for camera in &self.cameras {
            schema.extend(camera.schema());
        }
        schema
    }
}
