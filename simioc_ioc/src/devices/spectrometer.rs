//! Qmini spectrometer.
//!
//! The schema is declarative; the task copies every `SET_*` setpoint into
//! its readback on the next tick.

use simioc_common::consts::POLL_PERIOD;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::{SimError, SimTask};
use std::time::Duration;

/// Maximum length of the spectrum and wavelength waveforms.
pub const SPECTRUM_LENGTH: usize = 2500;

const STATUS_STRINGS: [&str; 8] = [
    "Idle",
    "Waiting For Trig",
    "TakingSpectrum",
    "Waiting for Temp",
    "Not Ready",
    "Busy",
    "Error",
    "Closed",
];

const NO_YES: [&str; 2] = ["No", "Yes"];
const PINS: [&str; 4] = ["Pin 0", "Pin 1", "Pin 2", "Pin 3"];
const EDGES: [&str; 2] = ["Falling", "Rising"];

/// Processing flags, all `No`/`Yes` enums.
const PROCESSING_FLAGS: [&str; 10] = [
    "ADJUST_OFFSET",
    "CORRECT_NONLINEARITY",
    "REMOVE_BAD_PIXELS",
    "SUBTRACT_DARK",
    "REMOVE_TEMP_BAD_PIXELS",
    "NORMALIZE_EXPOSURE",
    "SENSITIVITY_CAL",
    "CORRECT_PRNU",
    "ADDITIONAL_FILTERING",
    "SCALE_TO_16BIT",
];

/// `(setpoint, readback)` suffixes mirrored on every tick.
const MIRRORED: [(&str, &str); 6] = [
    (":SET_EXPOSURE_TIME", ":GET_EXPOSURE_TIME"),
    (":SET_TRIG_DELAY", ":GET_TRIG_DELAY"),
    (":SET_TRIG_PIN", ":TRIG_PIN_RBV"),
    (":SET_TRIG_EDGE", ":TRIG_EDGE_RBV"),
    (":SET_TRIG_ENABLE", ":GET_TRIG_ENABLE"),
    (":SET_PROCESSING_STEPS", ":GET_PROCESSING_STEPS"),
];

/// Qmini spectrometer PVs and mirror task.
#[derive(Debug, Clone)]
pub struct Qmini {
    prefix: String,
    period: Duration,
}

impl Qmini {
    /// Spectrometer under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            period: POLL_PERIOD,
        }
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let ro = PvMetadata::new().read_only();
        let rw = PvMetadata::new();
        let no_yes = || PvMetadata::new().enum_strings(&NO_YES);
        let fit = || PvMetadata::new().precision(0).read_only();
        let waveform = || {
            PvMetadata::new()
                .max_length(SPECTRUM_LENGTH)
                .read_only()
        };

        let mut schema = PvSchema::new();
        schema
            .add(
                self.pv(":STATUS"),
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&STATUS_STRINGS).read_only(),
            )
            .add(self.pv(":TEMP"), 0.0, fit())
            .add(self.pv(":SET_EXPOSURE_TIME"), 0, rw.clone())
            .add(self.pv(":GET_EXPOSURE_TIME"), 0, ro.clone())
            .pair(
                self.pv(":TRIG_MODE"),
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&["Trigger On Start", "Trigger On End"]),
            )
            .add(self.pv(":SET_TRIG_DELAY"), 0, rw.clone())
            .add(self.pv(":GET_TRIG_DELAY"), 0, ro.clone())
            .add(
                self.pv(":SET_TRIG_PIN"),
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&PINS),
            )
            .add(
                self.pv(":TRIG_PIN_RBV"),
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&PINS).read_only(),
            )
            .add(
                self.pv(":SET_TRIG_EDGE"),
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&EDGES),
            )
            .add(
                self.pv(":TRIG_EDGE_RBV"),
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&EDGES).read_only(),
            )
            .add(self.pv(":SET_TRIG_ENABLE"), PvValue::Enum(0), no_yes())
            .add(self.pv(":GET_TRIG_ENABLE"), PvValue::Enum(0), no_yes().read_only())
            .add(self.pv(":GET_SPECTRUM.SCAN"), 0, rw.clone())
            .add(self.pv(":CLEAR_SPECTROMETER"), 0, rw.clone())
            .add(self.pv(":SPECTRUM"), vec![0.0], waveform())
            .add(self.pv(":WAVELENGTHS"), vec![0.0], waveform())
            .add(self.pv(":MODEL_CODE"), 0, ro.clone())
            .add(self.pv(":SERIAL_NUMBER"), 0, ro.clone());

        for flag in PROCESSING_FLAGS {
            schema.add(self.pv(&format!(":{flag}")), PvValue::Enum(0), no_yes());
        }

        schema
            .add(self.pv(":SET_PROCESSING_STEPS"), 0, rw.clone())
            .add(self.pv(":GET_PROCESSING_STEPS"), 0, ro)
            .add(self.pv(":FIT_ON"), PvValue::Enum(0), no_yes())
            .add(self.pv(":WIDTH"), 0, rw)
            .add(self.pv(":W0_GUESS"), 0.0, PvMetadata::new().precision(0))
            .add(self.pv(":W0_FIT"), 0.0, fit())
            .add(self.pv(":FWHM"), 0.0, fit())
            .add(self.pv(":AMPLITUDE"), 0.0, fit())
            .add(self.pv(":STDEV"), 0.0, fit())
            .add(self.pv(":CHISQ"), 0.0, fit());
        schema
    }
}

impl SimTask for Qmini {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        for (setpoint, readback) in MIRRORED {
            let value = store.value(&self.pv(setpoint))?;
            store.update_if_differs(&self.pv(readback), value)?;
        }
        Ok(())
    }
}
