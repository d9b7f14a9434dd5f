//! PV metadata.

use serde::Serialize;

/// Metadata served alongside a PV value.
///
/// Built with chained setters:
///
/// ```
/// use simioc_common::pv::PvMetadata;
///
/// let meta = PvMetadata::new()
///     .precision(3)
///     .units("mm")
///     .doc("User readback");
/// assert_eq!(meta.precision, Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PvMetadata {
    /// Display precision (digits after the decimal point).
    pub precision: Option<u16>,
    /// Ordered enum strings; index is the enum value.
    pub enum_strings: Vec<String>,
    /// External writes are rejected.
    pub read_only: bool,
    /// Lower control limit, enforced on external writes.
    pub lower_limit: Option<f64>,
    /// Upper control limit, enforced on external writes.
    pub upper_limit: Option<f64>,
    /// Maximum length of string and waveform values.
    pub max_length: Option<usize>,
    /// Engineering units.
    pub units: Option<String>,
    /// Description.
    pub doc: Option<String>,
}

impl PvMetadata {
    /// Empty metadata (writable, no limits).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set display precision.
    pub fn precision(mut self, precision: u16) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Set enum strings.
    pub fn enum_strings(mut self, strings: &[&str]) -> Self {
        self.enum_strings = strings.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Mark read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set control limits.
    pub fn limits(mut self, lower: f64, upper: f64) -> Self {
        self.lower_limit = Some(lower);
        self.upper_limit = Some(upper);
        self
    }

    /// Set maximum string/waveform length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Set engineering units.
    pub fn units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    /// Set description.
    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    /// Name of enum index `index`, if defined.
    pub fn enum_name(&self, index: u16) -> Option<&str> {
        self.enum_strings.get(usize::from(index)).map(String::as_str)
    }

    /// Check `value` against the control limits.
    pub fn within_limits(&self, value: f64) -> bool {
        let above = self.lower_limit.is_none_or(|lo| value >= lo);
        let below = self.upper_limit.is_none_or(|hi| value <= hi);
        above && below
    }
}
