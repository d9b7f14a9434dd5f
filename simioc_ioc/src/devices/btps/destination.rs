//! Per-destination and per-(source, destination) BTPS configuration.

use simioc_common::consts::MAX_STRING_LENGTH;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::SimError;

use crate::devices::range::{CentroidConfig, RangeComparison, VALID_STRINGS};

const READY_STRINGS: [&str; 2] = ["Not ready", "Ready"];

/// One camera centroid sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// Centroid X.
    pub x: f64,
    /// Centroid Y.
    pub y: f64,
    /// Camera is producing frames.
    pub valid: bool,
}

/// Measurements feeding one [`SourceConfig`] pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInputs {
    /// Linear stage readback.
    pub linear: f64,
    /// Rotary stage readback.
    pub rotary: f64,
    /// Goniometer readback.
    pub goniometer: f64,
    /// Near-field camera.
    pub near_field: Centroid,
    /// Far-field camera.
    pub far_field: Centroid,
    /// Source gate valve open and interlocked.
    pub entry_valve_ready: bool,
}

/// Result of one [`SourceConfig`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceStatus {
    /// Linear stage in range.
    pub in_position: bool,
    /// Every comparison input valid.
    pub data_valid: bool,
    /// Every comparison in range and the entry valve ready.
    pub checks_ok: bool,
}

/// Range checks of one laser source towards one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    source: u8,
    prefix: String,
    /// `Linear:` stage check.
    pub linear: RangeComparison,
    /// `Rotary:` stage check.
    pub rotary: RangeComparison,
    /// `Goniometer:` stage check.
    pub goniometer: RangeComparison,
    /// `NF` centroid check.
    pub near_field: CentroidConfig,
    /// `FF` centroid check.
    pub far_field: CentroidConfig,
}

impl SourceConfig {
    /// Source `source` under the destination prefix.
    pub fn new(dest_prefix: &str, source: u8) -> Self {
        let prefix = format!("{dest_prefix}SRC:{source:02}:");
        Self {
            source,
            linear: RangeComparison::new(format!("{prefix}Linear:")),
            rotary: RangeComparison::new(format!("{prefix}Rotary:")),
            goniometer: RangeComparison::new(format!("{prefix}Goniometer:")),
            near_field: CentroidConfig::new(&format!("{prefix}NF")),
            far_field: CentroidConfig::new(&format!("{prefix}FF")),
            prefix,
        }
    }

    /// Laser source number.
    pub fn source(&self) -> u8 {
        self.source
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `Name_RBV`.
    pub fn name_pv(&self) -> String {
        self.pv("Name_RBV")
    }

    /// `InPosition_RBV`.
    pub fn in_position_pv(&self) -> String {
        self.pv("InPosition_RBV")
    }

    /// `EntryValveReady_RBV`.
    pub fn entry_valve_ready_pv(&self) -> String {
        self.pv("EntryValveReady_RBV")
    }

    /// `ChecksOK_RBV`.
    pub fn checks_ok_pv(&self) -> String {
        self.pv("ChecksOK_RBV")
    }

    /// `Valid_RBV`.
    pub fn data_valid_pv(&self) -> String {
        self.pv("Valid_RBV")
    }

    /// Stage checks in linear, rotary, goniometer order.
    pub fn stage_checks(&self) -> [&RangeComparison; 3] {
        [&self.linear, &self.rotary, &self.goniometer]
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let derived = |strings: &[&str], doc: &str| {
            PvMetadata::new().enum_strings(strings).read_only().doc(doc)
        };

        let mut schema = PvSchema::new();
        schema.add(
            self.name_pv(),
            "name",
            PvMetadata::new()
                .max_length(MAX_STRING_LENGTH)
                .doc("Source name"),
        );
        schema
            .extend(self.far_field.schema())
            .extend(self.near_field.schema());
        for check in self.stage_checks() {
            schema.extend(check.schema());
        }
        schema
            .add(
                self.entry_valve_ready_pv(),
                PvValue::Enum(0),
                derived(&READY_STRINGS, "Entry valve is open and ready"),
            )
            .add(
                self.in_position_pv(),
                PvValue::Enum(0),
                derived(&["Not in position", "In position"], "Linear stage in range"),
            )
            .add(
                self.checks_ok_pv(),
                PvValue::Enum(0),
                derived(&["Failed", "Passed"], "Check summary"),
            )
            .add(
                self.data_valid_pv(),
                PvValue::Enum(0),
                derived(&VALID_STRINGS, "Data validity summary"),
            );
        schema
    }

    /// Feed the measurements through every check and publish the summary.
    pub fn simulate(
        &self,
        store: &dyn ValueStore,
        inputs: &SourceInputs,
    ) -> Result<SourceStatus, SimError> {
        let mut all_in_range = true;
        for (check, value) in self
            .stage_checks()
            .into_iter()
            .zip([inputs.linear, inputs.rotary, inputs.goniometer])
        {
            check.set_value(store, value)?;
            all_in_range &= check.simulate(store, true)?;
        }
        let in_position = self.linear.in_range(store)?;

        for (centroid, sample) in [
            (&self.near_field, &inputs.near_field),
            (&self.far_field, &inputs.far_field),
        ] {
            centroid.x.set_value(store, sample.x)?;
            centroid.y.set_value(store, sample.y)?;
            for check in centroid.checks() {
                all_in_range &= check.simulate(store, sample.valid)?;
            }
        }

        let status = SourceStatus {
            in_position,
            data_valid: inputs.near_field.valid && inputs.far_field.valid,
            checks_ok: all_in_range && inputs.entry_valve_ready,
        };

        store.update_if_differs(&self.in_position_pv(), PvValue::from(status.in_position))?;
        store.update_if_differs(
            &self.entry_valve_ready_pv(),
            PvValue::from(inputs.entry_valve_ready),
        )?;
        store.update_if_differs(&self.checks_ok_pv(), PvValue::from(status.checks_ok))?;
        store.update_if_differs(&self.data_valid_pv(), PvValue::from(status.data_valid))?;
        Ok(status)
    }
}

/// Settings and state of one BTPS destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    index: u8,
    prefix: String,
    sources: Vec<SourceConfig>,
    yields_control: bool,
}

impl DestinationConfig {
    /// Destination `index` (1-based) with one [`SourceConfig`] per source.
    pub fn new(state_prefix: &str, index: u8, sources: &[u8], yields_control: bool) -> Self {
        let prefix = format!("{state_prefix}DEST:{index:02}:");
        Self {
            index,
            sources: sources.iter().map(|s| SourceConfig::new(&prefix, *s)).collect(),
            prefix,
            yields_control,
        }
    }

    /// 1-based destination index.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Destination prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `Name_RBV`.
    pub fn name_pv(&self) -> String {
        format!("{}Name_RBV", self.prefix)
    }

    /// `ExitValveReady_RBV`.
    pub fn exit_valve_ready_pv(&self) -> String {
        format!("{}ExitValveReady_RBV", self.prefix)
    }

    /// Configuration for `source`.
    pub fn source(&self, source: u8) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.source == source)
    }

    /// All source configurations.
    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema.add(
            self.name_pv(),
            "name",
            PvMetadata::new()
                .max_length(MAX_STRING_LENGTH)
                .doc("Destination name"),
        );
        for source in &self.sources {
            schema.extend(source.schema());
        }
        schema.add(
            self.exit_valve_ready_pv(),
            PvValue::Enum(0),
            PvMetadata::new()
                .enum_strings(&READY_STRINGS)
                .read_only()
                .doc("Exit valve is open and ready"),
        );
        if self.yields_control {
            schema.pair(
                format!("{}YieldsControl", self.prefix),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["FALSE", "TRUE"])
                    .doc("Destination yields control to another hutch"),
            );
        }
        schema
    }

    /// Publish the exit valve state.
    pub fn set_exit_valve_ready(&self, store: &dyn ValueStore, ready: bool) -> Result<(), SimError> {
        store.update_if_differs(&self.exit_valve_ready_pv(), PvValue::from(ready))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simioc_common::pv::MemoryStore;

    fn centroid(valid: bool) -> Centroid {
        Centroid {
            x: 0.5,
            y: 0.5,
            valid,
        }
    }

    fn inputs(linear: f64) -> SourceInputs {
        SourceInputs {
            linear,
            rotary: 0.0,
            goniometer: 0.0,
            near_field: centroid(true),
            far_field: centroid(true),
            entry_valve_ready: true,
        }
    }

    fn registered() -> (MemoryStore, DestinationConfig) {
        let store = MemoryStore::new();
        let dest = DestinationConfig::new("B:", 3, &[1, 5, 8], false);
        dest.schema().register_into(&store).unwrap();
        (store, dest)
    }

    #[test]
    fn layout() {
        let dest = DestinationConfig::new("B:", 3, &[1, 5, 8], true);
        let src = dest.source(5).unwrap();
        assert_eq!(src.linear.value_pv(), "B:DEST:03:SRC:05:Linear:Value_RBV");
        assert_eq!(src.near_field.y.in_range_pv(), "B:DEST:03:SRC:05:NFCenterY:InRange_RBV");
        assert!(dest.schema().contains("B:DEST:03:YieldsControl_RBV"));
        assert!(dest.source(3).is_none());
    }

    #[test]
    fn in_position_follows_linear_check() {
        let (store, dest) = registered();
        let src = dest.source(1).unwrap();
        src.linear.set_nominal_default(&store, 405.0).unwrap();

        let status = src.simulate(&store, &inputs(405.05)).unwrap();
        assert!(status.in_position);
        assert_eq!(store.read_enum_name(&src.in_position_pv()).unwrap(), "In position");

        let status = src.simulate(&store, &inputs(300.0)).unwrap();
        assert!(!status.in_position);
        assert!(!status.checks_ok);
    }

    #[test]
    fn checks_ok_needs_every_check_and_valve() {
        let (store, dest) = registered();
        let src = dest.source(8).unwrap();
        for check in src.stage_checks() {
            check.set_nominal_default(&store, 0.0).unwrap();
        }
        for check in src.near_field.checks().into_iter().chain(src.far_field.checks()) {
            check.set_nominal(&store, 0.5, 0.25).unwrap();
        }

        assert!(src.simulate(&store, &inputs(0.0)).unwrap().checks_ok);
        assert_eq!(store.read_enum_name(&src.checks_ok_pv()).unwrap(), "Passed");

        let mut closed = inputs(0.0);
        closed.entry_valve_ready = false;
        assert!(!src.simulate(&store, &closed).unwrap().checks_ok);
        assert_eq!(store.read_enum_name(&src.entry_valve_ready_pv()).unwrap(), "Not ready");

        let mut stale = inputs(0.0);
        stale.far_field.valid = false;
        let status = src.simulate(&store, &stale).unwrap();
        assert!(!status.data_valid);
        assert!(!status.checks_ok);
        assert_eq!(store.read_enum_name(&src.data_valid_pv()).unwrap(), "Data Invalid");
    }

    #[test]
    fn exit_valve_flag() {
        let (store, dest) = registered();
        dest.set_exit_valve_ready(&store, true).unwrap();
        assert_eq!(store.read_enum_name(&dest.exit_valve_ready_pv()).unwrap(), "Ready");
    }
}
