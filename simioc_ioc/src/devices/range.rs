//! Range comparison checks.
//!
//! A `RangeComparison` owns a measured value, configurable `Low`, `Nominal`,
//! `High` and `Inclusive` setpoint/readback pairs, and two derived enums:
//! `Valid_RBV` and `InRange_RBV`. The derived values are recomputed on every
//! pass and written only when they change.

use simioc_common::consts::DEFAULT_TOLERANCE;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::SimError;

/// Enum strings of `InRange_RBV`.
pub const IN_RANGE_STRINGS: [&str; 2] = ["Out of range", "In range"];

/// Enum strings of `Valid_RBV`.
pub const VALID_STRINGS: [&str; 2] = ["Data Invalid", "Data Valid"];

/// Three-way range policy.
///
/// Invalid input or an inverted range (`high < low`) is always out of
/// range, whatever `inclusive` says.
pub fn evaluate(value: f64, low: f64, high: f64, inclusive: bool, input_valid: bool) -> bool {
    if !input_valid || high < low {
        false
    } else if inclusive {
        low <= value && value <= high
    } else {
        low < value && value < high
    }
}

/// PV names of one range comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeComparison {
    prefix: String,
}

impl RangeComparison {
    /// Comparison whose PVs start with `prefix` (e.g. `...:Linear:`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// Measured value PV.
    pub fn value_pv(&self) -> String {
        self.pv("Value_RBV")
    }

    /// Derived in-range PV.
    pub fn in_range_pv(&self) -> String {
        self.pv("InRange_RBV")
    }

    /// Derived validity PV.
    pub fn valid_pv(&self) -> String {
        self.pv("Valid_RBV")
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let prec = PvMetadata::new().precision(3);
        let mut schema = PvSchema::new();
        schema
            .add(
                self.value_pv(),
                0.0,
                prec.clone().read_only().doc("Current value from the control system"),
            )
            .add(
                self.in_range_pv(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&IN_RANGE_STRINGS)
                    .read_only()
                    .doc("Is the value currently in range?"),
            )
            .add(
                self.valid_pv(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&VALID_STRINGS)
                    .read_only()
                    .doc("Is the value considered valid?"),
            )
            .pair(
                self.pv("Low"),
                0.0,
                prec.clone().doc("Configurable lower bound for the value range"),
            )
            .pair(self.pv("Nominal"), 0.0, prec.clone().doc("The nominal value"))
            .pair(
                self.pv("High"),
                0.0,
                prec.doc("Configurable upper bound for the value range"),
            )
            .pair(
                self.pv("Inclusive"),
                0.0,
                PvMetadata::new().doc("Is the value comparison exclusive or inclusive?"),
            );
        schema
    }

    /// Set `Nominal` to `target` and the bounds to `target ± tolerance`.
    pub fn set_nominal(
        &self,
        store: &dyn ValueStore,
        target: f64,
        tolerance: f64,
    ) -> Result<(), SimError> {
        for (name, value) in [
            ("Nominal", target),
            ("Low", target - tolerance),
            ("High", target + tolerance),
        ] {
            store.post(&self.pv(name), PvValue::Double(value))?;
            store.post(&self.pv(&format!("{name}_RBV")), PvValue::Double(value))?;
        }
        Ok(())
    }

    /// [`Self::set_nominal`] with the default tolerance.
    pub fn set_nominal_default(&self, store: &dyn ValueStore, target: f64) -> Result<(), SimError> {
        self.set_nominal(store, target, DEFAULT_TOLERANCE)
    }

    /// Publish a new measured value.
    pub fn set_value(&self, store: &dyn ValueStore, value: f64) -> Result<(), SimError> {
        store.update_if_differs(&self.value_pv(), PvValue::Double(value))?;
        Ok(())
    }

    /// Recompute `Valid_RBV` and `InRange_RBV`. Returns the in-range result.
    pub fn simulate(&self, store: &dyn ValueStore, data_valid: bool) -> Result<bool, SimError> {
        store.update_if_differs(&self.valid_pv(), PvValue::from(data_valid))?;

        let in_range = evaluate(
            store.read_f64(&self.value_pv())?,
            store.read_f64(&self.pv("Low_RBV"))?,
            store.read_f64(&self.pv("High_RBV"))?,
            store.read_bool(&self.pv("Inclusive_RBV"))?,
            data_valid,
        );
        store.update_if_differs(&self.in_range_pv(), PvValue::from(in_range))?;
        Ok(in_range)
    }

    /// Current `InRange_RBV`.
    pub fn in_range(&self, store: &dyn ValueStore) -> Result<bool, SimError> {
        Ok(store.read_bool(&self.in_range_pv())?)
    }

    /// Current `Valid_RBV`.
    pub fn input_valid(&self, store: &dyn ValueStore) -> Result<bool, SimError> {
        Ok(store.read_bool(&self.valid_pv())?)
    }
}

/// Near- or far-field camera centroid check: X and Y comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentroidConfig {
    /// `CenterX:` comparison.
    pub x: RangeComparison,
    /// `CenterY:` comparison.
    pub y: RangeComparison,
}

impl CentroidConfig {
    /// Centroid check under `prefix` (e.g. `...:NF`).
    pub fn new(prefix: &str) -> Self {
        Self {
            x: RangeComparison::new(format!("{prefix}CenterX:")),
            y: RangeComparison::new(format!("{prefix}CenterY:")),
        }
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = self.x.schema();
        schema.extend(self.y.schema());
        schema
    }

    /// Both comparisons.
    pub fn checks(&self) -> [&RangeComparison; 2] {
        [&self.x, &self.y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simioc_common::pv::MemoryStore;

    fn registered(prefix: &str) -> (MemoryStore, RangeComparison) {
        let store = MemoryStore::new();
        let check = RangeComparison::new(prefix);
        check.schema().register_into(&store).unwrap();
        (store, check)
    }

    #[test]
    fn evaluate_policy() {
        assert!(evaluate(1.0, 0.0, 2.0, false, true));
        assert!(!evaluate(0.0, 0.0, 2.0, false, true));
        assert!(evaluate(0.0, 0.0, 2.0, true, true));
        assert!(!evaluate(1.0, 0.0, 2.0, true, false));
        assert!(!evaluate(1.0, 2.0, 0.0, true, true));
        assert!(!evaluate(f64::NAN, 0.0, 2.0, true, true));
    }

    #[test]
    fn set_nominal_writes_bounds() {
        let (store, check) = registered("D:Linear:");
        check.set_nominal_default(&store, 405.0).unwrap();
        assert_eq!(store.read_f64("D:Linear:Nominal_RBV").unwrap(), 405.0);
        assert!((store.read_f64("D:Linear:Low_RBV").unwrap() - 404.9).abs() < 1e-9);
        assert!((store.read_f64("D:Linear:High_RBV").unwrap() - 405.1).abs() < 1e-9);
    }

    #[test]
    fn simulate_writes_derived_values() {
        let (store, check) = registered("D:Linear:");
        check.set_nominal(&store, 10.0, 0.5).unwrap();
        check.set_value(&store, 10.2).unwrap();

        assert!(check.simulate(&store, true).unwrap());
        assert_eq!(store.read_enum_name("D:Linear:InRange_RBV").unwrap(), "In range");
        assert_eq!(store.read_enum_name("D:Linear:Valid_RBV").unwrap(), "Data Valid");

        assert!(!check.simulate(&store, false).unwrap());
        assert!(!check.in_range(&store).unwrap());
        assert!(!check.input_valid(&store).unwrap());
    }

    #[test]
    fn inclusive_flag_is_read_from_readback() {
        let (store, check) = registered("D:Rotary:");
        check.set_nominal(&store, 1.0, 1.0).unwrap();
        check.set_value(&store, 2.0).unwrap();
        assert!(!check.simulate(&store, true).unwrap());

        store.write("D:Rotary:Inclusive", PvValue::Double(1.0)).unwrap();
        assert!(check.simulate(&store, true).unwrap());
    }

    #[test]
    fn derived_values_are_read_only() {
        let (store, _check) = registered("D:Goniometer:");
        assert!(store.write("D:Goniometer:InRange_RBV", PvValue::Int(1)).is_err());
    }

    #[test]
    fn centroid_layout() {
        let centroid = CentroidConfig::new("D:SRC:01:NF");
        assert_eq!(centroid.x.value_pv(), "D:SRC:01:NFCenterX:Value_RBV");
        assert_eq!(centroid.schema().len(), 2 * 11);
    }
}
