//! Motor record PV layout.
//!
//! A motor record named `PREFIX` exposes its setpoint as `PREFIX` and its
//! fields as `PREFIX.FIELD`. Record variants share the motion fields and add
//! an auxiliary field set selected by [`MotorKind`].

use simioc_common::consts::MOTOR_TICK_RATE_HZ;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue};
use simioc_common::sim::MotorConfig;

/// SPMG enum strings of the standard motor record.
pub const SPMG_STRINGS: [&str; 4] = ["Stop", "Pause", "Move", "Go"];

/// SPG enum strings of the PCDS stop-pause-go variant.
pub const SPG_STRINGS: [&str; 3] = ["STOP", "PAUSE", "GO"];

/// Motor record variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorKind {
    /// Standard motor record.
    #[default]
    Plain,
    /// Newport XPS (`xps8p` record, adds SPG).
    Xps,
    /// IMS MDrive (`ims` record, adds SPG, RINI, PN and `:SEQ_SELN`).
    Ims,
    /// SmarAct piezo stepper extension.
    SmarAct,
    /// Aerotech status and fault extension.
    Aerotech,
}

impl MotorKind {
    /// Does the record carry the SPG field?
    pub fn has_spg(&self) -> bool {
        matches!(self, MotorKind::Xps | MotorKind::Ims)
    }
}

/// Initial record settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorDefaults {
    /// Initial position.
    pub position: f64,
    /// Velocity (EGU/s).
    pub velocity: f64,
    /// Display precision.
    pub precision: u16,
    /// Seconds to velocity.
    pub acceleration: f64,
    /// Motor resolution.
    pub resolution: f64,
    /// `(LLM, HLM)`.
    pub user_limits: (f64, f64),
    /// Engineering units.
    pub egu: String,
    /// Simulation tick rate.
    pub tick_rate_hz: f64,
}

impl Default for MotorDefaults {
    fn default() -> Self {
        Self {
            position: 0.0,
            velocity: 1.0,
            precision: 3,
            acceleration: 1.0,
            resolution: 1e-6,
            user_limits: (0.0, 100.0),
            egu: "mm".to_string(),
            tick_rate_hz: MOTOR_TICK_RATE_HZ,
        }
    }
}

impl MotorDefaults {
    /// Defaults of a bare record simulator without IOC-level settings.
    pub fn bare() -> Self {
        Self {
            velocity: 0.1,
            ..Self::default()
        }
    }

    /// Starting position.
    pub fn at(mut self, position: f64) -> Self {
        self.position = position;
        self
    }

    /// Velocity.
    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    /// Precision.
    pub fn with_precision(mut self, precision: u16) -> Self {
        self.precision = precision;
        self
    }

    /// User limits.
    pub fn with_limits(mut self, low: f64, high: f64) -> Self {
        self.user_limits = (low, high);
        self
    }

    /// Apply configuration overrides.
    pub fn apply(mut self, config: &MotorConfig) -> Self {
        if let Some(v) = config.position {
            self.position = v;
        }
        if let Some(v) = config.velocity {
            self.velocity = v;
        }
        if let Some(v) = config.precision {
            self.precision = v;
        }
        if let Some(v) = config.acceleration {
            self.acceleration = v;
        }
        if let Some(v) = config.resolution {
            self.resolution = v;
        }
        if let Some([low, high]) = config.user_limits {
            self.user_limits = (low, high);
        }
        if let Some(egu) = &config.egu {
            self.egu = egu.clone();
        }
        self
    }
}

/// Names of a motor record's PVs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorRecord {
    prefix: String,
    kind: MotorKind,
}

impl MotorRecord {
    /// Record named `prefix`.
    pub fn new(prefix: impl Into<String>, kind: MotorKind) -> Self {
        Self {
            prefix: prefix.into(),
            kind,
        }
    }

    /// Record name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Variant.
    pub fn kind(&self) -> MotorKind {
        self.kind
    }

    /// `PREFIX.FIELD`.
    pub fn field(&self, field: &str) -> String {
        format!("{}.{}", self.prefix, field)
    }

    /// `PREFIX:SUFFIX` style auxiliary PV.
    pub fn aux(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// User setpoint (VAL).
    pub fn val(&self) -> String {
        self.prefix.clone()
    }

    /// User readback.
    pub fn rbv(&self) -> String {
        self.field("RBV")
    }

    /// SPG field, if the variant has one.
    pub fn spg(&self) -> Option<String> {
        self.kind.has_spg().then(|| self.field("SPG"))
    }

    /// Double-valued fields that share the record's display precision.
    pub fn precision_fields(&self) -> Vec<String> {
        let mut fields = vec![self.val()];
        fields.extend(
            ["RBV", "DRBV", "VELO", "ACCL", "MRES", "LLM", "HLM"]
                .iter()
                .map(|f| self.field(f)),
        );
        fields
    }

    /// Full PV schema for this record.
    pub fn schema(&self, defaults: &MotorDefaults) -> PvSchema {
        let prec = PvMetadata::new()
            .precision(defaults.precision)
            .units(&defaults.egu);
        let ro = PvMetadata::new().read_only();
        let raw = defaults.position / defaults.resolution.max(simioc_common::consts::MIN_RESOLUTION);

        let mut schema = PvSchema::new();
        schema
            .add(self.val(), defaults.position, prec.clone().doc("User setpoint"))
            .add(self.rbv(), defaults.position, prec.clone().read_only().doc("User readback"))
            .add(self.field("DRBV"), defaults.position, prec.clone().read_only().doc("Dial readback"))
            .add(self.field("RRBV"), raw.round() as i64, ro.clone().doc("Raw readback"))
            .add(self.field("VELO"), defaults.velocity, prec.clone().doc("Velocity (EGU/s)"))
            .add(self.field("ACCL"), defaults.acceleration, PvMetadata::new().doc("Seconds to velocity"))
            .add(self.field("MRES"), defaults.resolution, PvMetadata::new().doc("Motor step size"))
            .add(self.field("LLM"), defaults.user_limits.0, prec.clone().doc("User low limit"))
            .add(self.field("HLM"), defaults.user_limits.1, prec.doc("User high limit"))
            .add(self.field("STOP"), 0, PvMetadata::new().doc("Stop"))
            .add(
                self.field("SPMG"),
                PvValue::Enum(3),
                PvMetadata::new().enum_strings(&SPMG_STRINGS).doc("Stop/Pause/Move/Go"),
            )
            .add(self.field("DMOV"), 1, ro.clone().doc("Done moving to value"))
            .add(self.field("MOVN"), 0, ro.clone().doc("Motor is moving"))
            .add(self.field("MSTA"), 0, ro.clone().doc("Motor status"))
            .add(self.field("LVIO"), 0, ro.clone().doc("Limit violation"))
            .add(self.field("HLS"), 0, ro.clone().doc("At high limit"))
            .add(self.field("LLS"), 0, ro.doc("At low limit"))
            .add(
                self.field("EGU"),
                defaults.egu.as_str(),
                PvMetadata::new().max_length(16).doc("Engineering units"),
            )
            .add(self.field("DESC"), "", PvMetadata::new().max_length(40));

        schema.extend(self.aux_schema());
        schema
    }

    fn aux_schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        let spg = || {
            PvMetadata::new()
                .enum_strings(&SPG_STRINGS)
                .doc("PCDS stop-pause-go variant of SPMG")
        };

        match self.kind {
            MotorKind::Plain => {}
            MotorKind::Xps => {
                schema.add(self.field("SPG"), PvValue::Enum(2), spg());
            }
            MotorKind::Ims => {
                schema
                    .add(self.field("SPG"), PvValue::Enum(2), spg())
                    .add(self.field("RINI"), 0, PvMetadata::new().doc("Reinitialize command"))
                    .add(
                        self.field("PN"),
                        "",
                        PvMetadata::new().read_only().max_length(40).doc("Part number"),
                    )
                    .add(self.aux(":SEQ_SELN"), 0, PvMetadata::new());
            }
            MotorKind::SmarAct => {
                schema
                    .pair(self.aux(":PTYPE"), 0, PvMetadata::new().doc("Positioner type"))
                    .add(
                        self.aux(":STEP_VOLTAGE"),
                        0.0,
                        PvMetadata::new().doc("Voltage for sawtooth (0-100V)"),
                    )
                    .add(self.aux(":STEP_FREQ"), 0.0, PvMetadata::new().doc("Sawtooth drive frequency"))
                    .add(
                        self.aux(":STEP_COUNT"),
                        0,
                        PvMetadata::new().doc("Number of steps per FWD/BWD command"),
                    )
                    .add(self.aux(":STEP_FORWARD"), 0, PvMetadata::new().doc("Jog the stage forward"))
                    .add(self.aux(":STEP_REVERSE"), 0, PvMetadata::new().doc("Jog the stage backward"))
                    .add(
                        self.aux(":TOTAL_STEP_COUNT"),
                        0,
                        PvMetadata::new().read_only().doc("Current open loop step count"),
                    )
                    .add(self.aux(":CLEAR_COUNT"), 0, PvMetadata::new().doc("Clear the current step count"))
                    .add(self.aux(":SCAN_POS"), 0, PvMetadata::new().doc("Piezo voltage (16 bit ADC steps)"))
                    .add(self.aux(":SCAN_MOVE"), 0, PvMetadata::new());
            }
            MotorKind::Aerotech => {
                let ro = PvMetadata::new().read_only();
                schema
                    .add(self.aux(":AXIS_STATUS"), 0, ro.clone())
                    .add(self.aux(":AXIS_FAULT"), 0, ro)
                    .add(self.aux(":CLEAR"), 0, PvMetadata::new())
                    .add(self.aux(":CONFIG"), 0, PvMetadata::new())
                    .add(self.aux(":ZERO_P"), 0, PvMetadata::new());
            }
        }
        schema
    }
}

/// PVs of an Attocube ECC axis. Not a motor record: the target setpoint is
/// mirrored straight into the position readback.
pub fn attocube_schema(prefix: &str) -> PvSchema {
    let ro = PvMetadata::new().read_only();
    let pv = |suffix: &str| format!("{prefix}{suffix}");

    let mut schema = PvSchema::new();
    schema
        .pair_named(
            pv(":CMD:TARGET"),
            pv(":POSITION"),
            0.0,
            PvMetadata::new().limits(-10.0, 10.0),
        )
        .add(pv(":UNIT"), "mm", ro.clone())
        .add(pv(":CMD:AMPL"), 0.0, PvMetadata::new())
        .add(pv(":CMD:DC"), 0.0, PvMetadata::new())
        .add(pv(":CMD:FREQ"), 0.0, PvMetadata::new())
        .add(pv(":ST_CONNECT"), true, ro.clone())
        .add(pv(":ST_ENABLED"), true, ro.clone())
        .add(pv(":ST_REFVAL"), true, ro.clone())
        .add(pv(":ST_ERROR"), false, ro.clone())
        .add(pv(":RD_MOVING"), false, ro.clone())
        .add(pv(":RD_INRANGE"), false, ro.clone())
        .add(pv(":ST_EOT_FWD"), false, PvMetadata::new())
        .add(pv(":ST_EOT_BWD"), false, PvMetadata::new())
        .add(pv(":REF_POSITION"), 0.0, ro)
        .add(pv(":CMD:STOP"), 0, PvMetadata::new())
        .add(pv(":CMD:RESET.PROC"), 0, PvMetadata::new())
        .add(pv(":CMD:ENABLE"), true, PvMetadata::new());
    schema
}
