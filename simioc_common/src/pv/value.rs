//! Typed PV values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a PV, fixed at registration by its initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PvKind {
    /// Signed integer (`long`).
    Int,
    /// Floating point (`double`).
    Double,
    /// Index into the PV's enum strings.
    Enum,
    /// Character string.
    Str,
    /// Integer waveform.
    IntArray,
    /// Floating point waveform.
    DoubleArray,
}

impl fmt::Display for PvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PvKind::Int => "int",
            PvKind::Double => "double",
            PvKind::Enum => "enum",
            PvKind::Str => "string",
            PvKind::IntArray => "int array",
            PvKind::DoubleArray => "double array",
        };
        f.write_str(s)
    }
}

/// A PV value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PvValue {
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// Enum index.
    Enum(u16),
    /// String.
    Str(String),
    /// Integer waveform.
    IntArray(Vec<i64>),
    /// Floating point waveform.
    DoubleArray(Vec<f64>),
}

impl PvValue {
    /// The kind of this value.
    pub fn kind(&self) -> PvKind {
        match self {
            PvValue::Int(_) => PvKind::Int,
            PvValue::Double(_) => PvKind::Double,
            PvValue::Enum(_) => PvKind::Enum,
            PvValue::Str(_) => PvKind::Str,
            PvValue::IntArray(_) => PvKind::IntArray,
            PvValue::DoubleArray(_) => PvKind::DoubleArray,
        }
    }

    /// Numeric view of scalar values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Int(v) => Some(*v as f64),
            PvValue::Double(v) => Some(*v),
            PvValue::Enum(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Integer view of integral scalar values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PvValue::Int(v) => Some(*v),
            PvValue::Enum(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Truthiness of scalar values (non-zero is true).
    pub fn as_bool(&self) -> Option<bool> {
        self.as_f64().map(|v| v != 0.0)
    }

    /// String view of string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PvValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Element count for strings and waveforms; `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            PvValue::Str(s) => Some(s.len()),
            PvValue::IntArray(v) => Some(v.len()),
            PvValue::DoubleArray(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Convert `self` into a value of `kind`.
    ///
    /// Lossless widenings are accepted: `Int → Double`, `Int ↔ Enum` and
    /// `Str → Enum` by enum string name. Everything else returns `None`.
    pub fn coerce(self, kind: PvKind, enum_strings: &[String]) -> Option<PvValue> {
        if self.kind() == kind {
            return Some(self);
        }
        match (self, kind) {
            (PvValue::Int(v), PvKind::Double) => Some(PvValue::Double(v as f64)),
            (PvValue::Int(v), PvKind::Enum) => u16::try_from(v).ok().map(PvValue::Enum),
            (PvValue::Enum(v), PvKind::Int) => Some(PvValue::Int(i64::from(v))),
            (PvValue::Str(s), PvKind::Enum) => enum_strings
                .iter()
                .position(|e| *e == s)
                .and_then(|idx| u16::try_from(idx).ok())
                .map(PvValue::Enum),
            _ => None,
        }
    }
}

impl From<f64> for PvValue {
    fn from(v: f64) -> Self {
        PvValue::Double(v)
    }
}

impl From<i64> for PvValue {
    fn from(v: i64) -> Self {
        PvValue::Int(v)
    }
}

impl From<i32> for PvValue {
    fn from(v: i32) -> Self {
        PvValue::Int(i64::from(v))
    }
}

impl From<bool> for PvValue {
    fn from(v: bool) -> Self {
        PvValue::Int(i64::from(v))
    }
}

impl From<&str> for PvValue {
    fn from(v: &str) -> Self {
        PvValue::Str(v.to_string())
    }
}

impl From<String> for PvValue {
    fn from(v: String) -> Self {
        PvValue::Str(v)
    }
}

impl From<Vec<f64>> for PvValue {
    fn from(v: Vec<f64>) -> Self {
        PvValue::DoubleArray(v)
    }
}

impl From<Vec<i64>> for PvValue {
    fn from(v: Vec<i64>) -> Self {
        PvValue::IntArray(v)
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Int(v) => write!(f, "{v}"),
            PvValue::Double(v) => write!(f, "{v}"),
            PvValue::Enum(v) => write!(f, "enum[{v}]"),
            PvValue::Str(s) => write!(f, "{s:?}"),
            PvValue::IntArray(v) => write!(f, "[{} ints]", v.len()),
            PvValue::DoubleArray(v) => write!(f, "[{} doubles]", v.len()),
        }
    }
}
