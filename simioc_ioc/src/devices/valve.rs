//! Vacuum gate valves (VGC family).
//!
//! A valve is assembled from capability blocks, each owning a slice of the
//! valve's PVs:
//!
//! - [`ValveBase`] - open command, interlock, PLC output, error reset
//! - [`OverrideExt`] - override status and force-open
//! - [`StateExt`] - valve state enum and limit switches
//! - [`VacuumExt`] - pressure interlocks, at-vacuum setpoints, MPS state
//!
//! The state enum is declarative. The simulate pass derives only
//! `OPN_OK_RBV` and `OPN_DO_RBV`.

use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::SimError;

/// Valve state names, in `STATE_RBV` order.
pub const VALVE_STATES: [&str; 10] = [
    "Vented",
    "At Vacuum",
    "Differential Pressure",
    "Lost Vacuum",
    "Ext Fault",
    "AT Vacuum",
    "Triggered",
    "Vacuum Fault",
    "Close Timeout",
    "Open Timeout",
];

/// Index of "At Vacuum" in [`VALVE_STATES`].
pub const STATE_AT_VACUUM: u16 = 1;

const OPEN_CLOSE: [&str; 2] = ["CLOSE", "OPEN"];
const FALSE_TRUE: [&str; 2] = ["FALSE", "TRUE"];

fn ro_enum(strings: &[&str], doc: &str) -> PvMetadata {
    PvMetadata::new().enum_strings(strings).read_only().doc(doc)
}

fn field(prefix: &str, suffix: &str) -> String {
    format!("{prefix}:{suffix}")
}

/// Open command, interlock and PLC output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValveBase {
    prefix: String,
}

impl ValveBase {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// `OPN_SW` setpoint.
    pub fn open_command(&self) -> String {
        field(&self.prefix, "OPN_SW")
    }

    /// `OPN_OK_RBV`.
    pub fn interlock_ok(&self) -> String {
        field(&self.prefix, "OPN_OK_RBV")
    }

    /// `OPN_DO_RBV`.
    pub fn open_do(&self) -> String {
        field(&self.prefix, "OPN_DO_RBV")
    }

    fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .pair(
                self.open_command(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&OPEN_CLOSE)
                    .doc("Epics command to Open valve"),
            )
            .add(
                self.interlock_ok(),
                PvValue::Enum(0),
                ro_enum(&["OPN ILK NOT OK", "OPN ILK OK"], "Valve is OK to Open interlock"),
            )
            .add(
                self.open_do(),
                PvValue::Enum(0),
                ro_enum(&FALSE_TRUE, "PLC Output to Open valve"),
            )
            .pair(
                field(&self.prefix, "ALM_RST"),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&FALSE_TRUE)
                    .doc("Reset Error state to valid by toggling this"),
            );
        schema
    }
}

/// Override mode readback and force-open command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideExt {
    prefix: String,
}

impl OverrideExt {
    fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .add(
                field(&self.prefix, "OVRD_ON_RBV"),
                PvValue::Enum(0),
                ro_enum(&["Override OFF", "Override ON"], "Readback on Override mode"),
            )
            .pair(
                field(&self.prefix, "FORCE_OPN"),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["FALSE", "FORCE OPEN"])
                    .doc("Force open the valve in override mode"),
            );
        schema
    }
}

/// Valve state enum and limit switch inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateExt {
    prefix: String,
}

impl StateExt {
    /// `STATE_RBV`.
    pub fn state(&self) -> String {
        field(&self.prefix, "STATE_RBV")
    }

    fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .add(
                self.state(),
                PvValue::Enum(0),
                ro_enum(&VALVE_STATES, "Valve state"),
            )
            .add(
                field(&self.prefix, "OPN_DI_RBV"),
                PvValue::Enum(0),
                ro_enum(&["FALSE", "OPEN"], "Open limit switch digital input"),
            )
            .add(
                field(&self.prefix, "CLS_DI_RBV"),
                PvValue::Enum(0),
                ro_enum(&["FALSE", "CLOSE"], "Closed limit switch digital input"),
            );
        schema
    }
}

/// Pressure interlocks and at-vacuum detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VacuumExt {
    prefix: String,
}

impl VacuumExt {
    /// `DP_OK_RBV`.
    pub fn diff_press_ok(&self) -> String {
        field(&self.prefix, "DP_OK_RBV")
    }

    /// `EXT_ILK_OK_RBV`.
    pub fn ext_ilk_ok(&self) -> String {
        field(&self.prefix, "EXT_ILK_OK_RBV")
    }

    /// `AT_VAC_RBV`.
    pub fn at_vac(&self) -> String {
        field(&self.prefix, "AT_VAC_RBV")
    }

    fn schema(&self) -> PvSchema {
        let prec = PvMetadata::new().precision(2);
        let device = PvMetadata::new().max_length(80).read_only();
        let mut schema = PvSchema::new();
        schema
            .add(
                self.diff_press_ok(),
                PvValue::Enum(0),
                ro_enum(&["DP NOT OK", "DP OK"], "Differential pressure interlock ok"),
            )
            .add(
                self.ext_ilk_ok(),
                PvValue::Enum(0),
                ro_enum(&["NOT OK", "OK"], "External interlock ok"),
            )
            .pair(
                field(&self.prefix, "AT_VAC_SP"),
                0.0,
                prec.clone().doc("AT VAC Set point value"),
            )
            .pair(
                field(&self.prefix, "AT_VAC_HYS"),
                0.0,
                prec.doc("AT VAC Hysteresis"),
            )
            .add(
                self.at_vac(),
                PvValue::Enum(0),
                ro_enum(&["NOT AT VAC", "AT VAC"], "at vacuum setpoint is reached"),
            )
            .add(
                field(&self.prefix, "ERROR_RBV"),
                PvValue::Enum(0),
                ro_enum(&["NO ERROR", "ERROR PRESENT"], "Error Present"),
            )
            .add(
                field(&self.prefix, "MPS_FAULT_OK_RBV"),
                PvValue::Enum(0),
                ro_enum(&["MPS FAULT", "MPS OK"], "individual valve MPS state"),
            )
            .add(
                field(&self.prefix, "ILK_DEVICE_US_RBV"),
                "",
                device.clone().doc("Upstream vacuum device used for interlocking"),
            )
            .add(
                field(&self.prefix, "ILK_DEVICE_DS_RBV"),
                "",
                device.doc("Downstream vacuum device used for interlocking"),
            );
        schema
    }
}

/// Gate valve with differential-pressure interlock (VGC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateValve {
    prefix: String,
    /// Command and interlock block.
    pub base: ValveBase,
    /// Override block.
    pub overrides: OverrideExt,
    /// State block.
    pub state: StateExt,
    /// Vacuum block.
    pub vacuum: VacuumExt,
}

impl GateValve {
    /// Valve whose PVs start with `prefix:` (e.g. `LTLHN:LS1:VGC:01`).
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            base: ValveBase::new(&prefix),
            overrides: OverrideExt {
                prefix: prefix.clone(),
            },
            state: StateExt {
                prefix: prefix.clone(),
            },
            vacuum: VacuumExt {
                prefix: prefix.clone(),
            },
            prefix,
        }
    }

    /// Device prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// PV schema of all blocks.
    pub fn schema(&self) -> PvSchema {
        let mut schema = self.base.schema();
        schema
            .extend(self.overrides.schema())
            .extend(self.state.schema())
            .extend(self.vacuum.schema());
        schema
    }

    /// Names that must exist for [`Self::simulate`] to run.
    pub fn required_pvs(&self) -> [String; 5] {
        [
            self.base.open_command(),
            self.base.interlock_ok(),
            self.base.open_do(),
            self.vacuum.diff_press_ok(),
            self.vacuum.ext_ilk_ok(),
        ]
    }

    /// Derive the interlock and PLC output from the inputs.
    pub fn simulate(&self, store: &dyn ValueStore) -> Result<(), SimError> {
        let interlock_ok = store.read_bool(&self.vacuum.diff_press_ok())?
            && store.read_bool(&self.vacuum.ext_ilk_ok())?;
        let open_do = interlock_ok && store.read_bool(&self.base.open_command())?;

        store.update_if_differs(&self.base.interlock_ok(), PvValue::from(interlock_ok))?;
        store.update_if_differs(&self.base.open_do(), PvValue::from(open_do))?;
        Ok(())
    }

    /// Open and interlocked.
    pub fn is_ready(&self, store: &dyn ValueStore) -> Result<bool, SimError> {
        Ok(store.read_bool(&self.base.open_do())?)
    }

    /// Put the valve in the pumped-down, open state.
    pub fn seed_open(&self, store: &dyn ValueStore) -> Result<(), SimError> {
        store.post(&self.vacuum.diff_press_ok(), PvValue::Enum(1))?;
        store.post(&self.vacuum.ext_ilk_ok(), PvValue::Enum(1))?;
        store.post(&self.vacuum.at_vac(), PvValue::Enum(1))?;
        store.post(&self.state.state(), PvValue::Enum(STATE_AT_VACUUM))?;
        store.post(&self.base.open_command(), PvValue::Enum(1))?;
        store.post(&format!("{}_RBV", self.base.open_command()), PvValue::Enum(1))?;
        store.post(&field(&self.prefix, "OPN_DI_RBV"), PvValue::Enum(1))?;
        self.simulate(store)
    }
}
