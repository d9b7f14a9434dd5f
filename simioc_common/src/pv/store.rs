//! The value store: named typed values with metadata.
//!
//! Simulation tasks see the store through the [`ValueStore`] trait. Writes
//! come in two flavours:
//!
//! - [`ValueStore::write`] is the external (client) path. It enforces the
//!   read-only flag, type, enum range, length and control limits, bumps the
//!   PV's write generation, and mirrors the value into a linked `_RBV`
//!   readback.
//! - [`ValueStore::post`] is the owner path used by the simulators. It
//!   bypasses read-only and limits but not type checks, and leaves the
//!   generation untouched.
//!
//! The generation counter lets a task notice "a client wrote this" even when
//! the written value equals the current one.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

use super::metadata::PvMetadata;
use super::value::{PvKind, PvValue};

/// Error types for value store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PvError {
    /// No PV registered under this name
    #[error("PV not found: {0}")]
    NotFound(String),

    /// External write refused
    #[error("Write to {name} rejected: {reason}")]
    WriteRejected {
        /// PV name
        name: String,
        /// Human readable cause
        reason: String,
    },

    /// Value kind cannot be converted to the PV's kind
    #[error("Type mismatch for {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// PV name
        name: String,
        /// Registered kind
        expected: PvKind,
        /// Offered kind
        actual: PvKind,
    },

    /// Name registered twice
    #[error("PV already registered: {0}")]
    AlreadyRegistered(String),

    /// Enum index outside the enum strings
    #[error("Enum value {value} out of range for {name}")]
    EnumOutOfRange {
        /// PV name
        name: String,
        /// Offending index
        value: u16,
    },

    /// String or waveform longer than `max_length`
    #[error("Value for {name} exceeds max length {max}")]
    TooLong {
        /// PV name
        name: String,
        /// Configured maximum
        max: usize,
    },
}

/// Point-in-time copy of a PV.
#[derive(Debug, Clone, PartialEq)]
pub struct PvSnapshot {
    /// Current value
    pub value: PvValue,
    /// Current metadata
    pub metadata: PvMetadata,
    /// Number of accepted external writes
    pub generation: u64,
}

/// Interface the simulators consume.
pub trait ValueStore: Send + Sync {
    /// Register a new PV.
    fn register(&self, name: &str, initial: PvValue, metadata: PvMetadata) -> Result<(), PvError>;

    /// Link `setpoint` to `readback` so external writes to the setpoint are
    /// mirrored into the readback.
    fn link_readback(&self, setpoint: &str, readback: &str) -> Result<(), PvError>;

    /// Read value, metadata and generation.
    fn read(&self, name: &str) -> Result<PvSnapshot, PvError>;

    /// External write.
    fn write(&self, name: &str, value: PvValue) -> Result<(), PvError>;

    /// Owner write.
    fn post(&self, name: &str, value: PvValue) -> Result<(), PvError>;

    /// Owner write that only stores `value` if it differs from the current
    /// value. Returns whether a change was made.
    fn update_if_differs(&self, name: &str, value: PvValue) -> Result<bool, PvError>;

    /// Replace the display precision.
    fn set_precision(&self, name: &str, precision: u16) -> Result<(), PvError>;

    /// Is `name` registered?
    fn contains(&self, name: &str) -> bool;

    /// All registered names, sorted.
    fn names(&self) -> Vec<String>;

    /// Current value.
    fn value(&self, name: &str) -> Result<PvValue, PvError> {
        self.read(name).map(|s| s.value)
    }

    /// Current write generation.
    fn generation(&self, name: &str) -> Result<u64, PvError> {
        self.read(name).map(|s| s.generation)
    }

    /// Numeric value.
    fn read_f64(&self, name: &str) -> Result<f64, PvError> {
        let value = self.value(name)?;
        value.as_f64().ok_or_else(|| PvError::TypeMismatch {
            name: name.to_string(),
            expected: PvKind::Double,
            actual: value.kind(),
        })
    }

    /// Integer value (ints and enums).
    fn read_i64(&self, name: &str) -> Result<i64, PvError> {
        let value = self.value(name)?;
        value.as_i64().ok_or_else(|| PvError::TypeMismatch {
            name: name.to_string(),
            expected: PvKind::Int,
            actual: value.kind(),
        })
    }

    /// Truthiness of a numeric value.
    fn read_bool(&self, name: &str) -> Result<bool, PvError> {
        self.read_f64(name).map(|v| v != 0.0)
    }

    /// String value.
    fn read_string(&self, name: &str) -> Result<String, PvError> {
        match self.value(name)? {
            PvValue::Str(s) => Ok(s),
            other => Err(PvError::TypeMismatch {
                name: name.to_string(),
                expected: PvKind::Str,
                actual: other.kind(),
            }),
        }
    }

    /// Name of the current enum state.
    fn read_enum_name(&self, name: &str) -> Result<String, PvError> {
        let snapshot = self.read(name)?;
        match snapshot.value {
            PvValue::Enum(idx) => snapshot
                .metadata
                .enum_name(idx)
                .map(str::to_string)
                .ok_or(PvError::EnumOutOfRange {
                    name: name.to_string(),
                    value: idx,
                }),
            other => Err(PvError::TypeMismatch {
                name: name.to_string(),
                expected: PvKind::Enum,
                actual: other.kind(),
            }),
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: PvValue,
    metadata: PvMetadata,
    generation: u64,
    readback: Option<String>,
}

impl Entry {
    /// Convert and validate `value` for this entry.
    fn accept(&self, name: &str, value: PvValue) -> Result<PvValue, PvError> {
        let kind = self.value.kind();
        let actual = value.kind();
        let value = value
            .coerce(kind, &self.metadata.enum_strings)
            .ok_or_else(|| PvError::TypeMismatch {
                name: name.to_string(),
                expected: kind,
                actual,
            })?;

        if let PvValue::Enum(idx) = value {
            if !self.metadata.enum_strings.is_empty()
                && usize::from(idx) >= self.metadata.enum_strings.len()
            {
                return Err(PvError::EnumOutOfRange {
                    name: name.to_string(),
                    value: idx,
                });
            }
        }

        if let (Some(max), Some(len)) = (self.metadata.max_length, value.len()) {
            if len > max {
                return Err(PvError::TooLong {
                    name: name.to_string(),
                    max,
                });
            }
        }

        Ok(value)
    }
}

/// In-process [`ValueStore`] backed by a `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered PVs.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ValueStore for MemoryStore {
    fn register(&self, name: &str, initial: PvValue, metadata: PvMetadata) -> Result<(), PvError> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(PvError::AlreadyRegistered(name.to_string()));
        }

        let mut entry = Entry {
            value: initial.clone(),
            metadata,
            generation: 0,
            readback: None,
        };
        entry.value = entry.accept(name, initial)?;
        entries.insert(name.to_string(), entry);
        Ok(())
    }

    fn link_readback(&self, setpoint: &str, readback: &str) -> Result<(), PvError> {
        let mut entries = self.entries.write();
        if !entries.contains_key(readback) {
            return Err(PvError::NotFound(readback.to_string()));
        }
        let entry = entries
            .get_mut(setpoint)
            .ok_or_else(|| PvError::NotFound(setpoint.to_string()))?;
        entry.readback = Some(readback.to_string());
        Ok(())
    }

    fn read(&self, name: &str) -> Result<PvSnapshot, PvError> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| PvError::NotFound(name.to_string()))?;
        Ok(PvSnapshot {
            value: entry.value.clone(),
            metadata: entry.metadata.clone(),
            generation: entry.generation,
        })
    }

    fn write(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get(name)
            .ok_or_else(|| PvError::NotFound(name.to_string()))?;

        let rejected = |reason: String| PvError::WriteRejected {
            name: name.to_string(),
            reason,
        };

        if entry.metadata.read_only {
            return Err(rejected("read-only".to_string()));
        }

        let value = entry.accept(name, value).map_err(|e| rejected(e.to_string()))?;

        if matches!(value, PvValue::Int(_) | PvValue::Double(_)) {
            if let Some(v) = value.as_f64() {
                if !entry.metadata.within_limits(v) {
                    return Err(rejected(format!(
                        "{v} outside limits [{:?}, {:?}]",
                        entry.metadata.lower_limit, entry.metadata.upper_limit
                    )));
                }
            }
        }

        // Both halves are validated before either is committed.
        let mirrored = match &entry.readback {
            Some(readback) => match entries.get(readback) {
                Some(rb) => Some((
                    readback.clone(),
                    rb.accept(readback, value.clone())
                        .map_err(|e| rejected(e.to_string()))?,
                )),
                None => None,
            },
            None => None,
        };

        trace!("write {} = {}", name, value);
        if let Some(entry) = entries.get_mut(name) {
            entry.value = value;
            entry.generation += 1;
        }
        if let Some((readback, value)) = mirrored {
            if let Some(rb) = entries.get_mut(&readback) {
                rb.value = value;
            }
        }
        Ok(())
    }

    fn post(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PvError::NotFound(name.to_string()))?;
        entry.value = entry.accept(name, value)?;
        Ok(())
    }

    fn update_if_differs(&self, name: &str, value: PvValue) -> Result<bool, PvError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PvError::NotFound(name.to_string()))?;
        let value = entry.accept(name, value)?;
        if entry.value == value {
            return Ok(false);
        }
        entry.value = value;
        Ok(true)
    }

    fn set_precision(&self, name: &str, precision: u16) -> Result<(), PvError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PvError::NotFound(name.to_string()))?;
        entry.metadata.precision = Some(precision);
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_defaults() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .register("X:VAL", PvValue::Double(0.0), PvMetadata::new().precision(3))
            .unwrap();
        store
            .register("X:RBV", PvValue::Double(0.0), PvMetadata::new().read_only())
            .unwrap();
        store
            .register(
                "X:REQ",
                PvValue::Enum(0),
                PvMetadata::new().enum_strings(&["FALSE", "TRUE"]),
            )
            .unwrap();
        store
    }

    #[test]
    fn register_twice_fails() {
        let store = store_with_defaults();
        let err = store
            .register("X:VAL", PvValue::Double(1.0), PvMetadata::new())
            .unwrap_err();
        assert_eq!(err, PvError::AlreadyRegistered("X:VAL".to_string()));
    }

    #[test]
    fn external_write_to_read_only_is_rejected() {
        let store = store_with_defaults();
        let err = store.write("X:RBV", PvValue::Double(1.0)).unwrap_err();
        assert!(matches!(err, PvError::WriteRejected { .. }));
        assert_eq!(store.read_f64("X:RBV").unwrap(), 0.0);

        // Owner side may update it.
        store.post("X:RBV", PvValue::Double(1.0)).unwrap();
        assert_eq!(store.read_f64("X:RBV").unwrap(), 1.0);
    }

    #[test]
    fn type_mismatch_is_rejected_on_both_paths() {
        let store = store_with_defaults();
        assert!(matches!(
            store.write("X:VAL", PvValue::from("abc")),
            Err(PvError::WriteRejected { .. })
        ));
        assert!(matches!(
            store.post("X:VAL", PvValue::from("abc")),
            Err(PvError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn write_bumps_generation_even_when_equal() {
        let store = store_with_defaults();
        assert_eq!(store.generation("X:VAL").unwrap(), 0);
        store.write("X:VAL", PvValue::Double(0.0)).unwrap();
        store.write("X:VAL", PvValue::Double(0.0)).unwrap();
        assert_eq!(store.generation("X:VAL").unwrap(), 2);

        store.post("X:VAL", PvValue::Double(5.0)).unwrap();
        assert_eq!(store.generation("X:VAL").unwrap(), 2);
    }

    #[test]
    fn linked_readback_mirrors_external_writes() {
        let store = store_with_defaults();
        store.link_readback("X:VAL", "X:RBV").unwrap();
        store.write("X:VAL", PvValue::Int(4)).unwrap();
        assert_eq!(store.value("X:RBV").unwrap(), PvValue::Double(4.0));

        assert!(matches!(
            store.link_readback("X:VAL", "X:MISSING"),
            Err(PvError::NotFound(_))
        ));
    }

    #[test]
    fn rejected_mirror_leaves_setpoint_untouched() {
        let store = MemoryStore::new();
        store
            .register("X:DESC", PvValue::from("ab"), PvMetadata::new().max_length(10))
            .unwrap();
        store
            .register("X:DESC_RBV", PvValue::from("ab"), PvMetadata::new().max_length(3).read_only())
            .unwrap();
        store.link_readback("X:DESC", "X:DESC_RBV").unwrap();

        let err = store.write("X:DESC", PvValue::from("abcdef")).unwrap_err();
        assert!(matches!(err, PvError::WriteRejected { .. }));
        assert_eq!(store.read_string("X:DESC").unwrap(), "ab");
        assert_eq!(store.read_string("X:DESC_RBV").unwrap(), "ab");
        assert_eq!(store.generation("X:DESC").unwrap(), 0);

        store.write("X:DESC", PvValue::from("abc")).unwrap();
        assert_eq!(store.read_string("X:DESC_RBV").unwrap(), "abc");
        assert_eq!(store.generation("X:DESC").unwrap(), 1);
    }

    #[test]
    fn enum_writes_by_index_and_name() {
        let store = store_with_defaults();
        store.write("X:REQ", PvValue::from("TRUE")).unwrap();
        assert_eq!(store.read_enum_name("X:REQ").unwrap(), "TRUE");
        store.write("X:REQ", PvValue::Int(0)).unwrap();
        assert_eq!(store.read_i64("X:REQ").unwrap(), 0);

        assert!(matches!(
            store.post("X:REQ", PvValue::Enum(2)),
            Err(PvError::EnumOutOfRange { value: 2, .. })
        ));
    }

    #[test]
    fn limits_apply_to_external_writes_only() {
        let store = MemoryStore::new();
        store
            .register("GAP", PvValue::Double(10.0), PvMetadata::new().limits(7.2, 19.0))
            .unwrap();
        assert!(store.write("GAP", PvValue::Double(25.0)).is_err());
        assert!(store.write("GAP", PvValue::Double(12.0)).is_ok());
        assert!(store.post("GAP", PvValue::Double(25.0)).is_ok());
    }

    #[test]
    fn max_length_is_enforced() {
        let store = MemoryStore::new();
        store
            .register("NAME", PvValue::from("name"), PvMetadata::new().max_length(4))
            .unwrap();
        assert!(matches!(
            store.post("NAME", PvValue::from("toolong")),
            Err(PvError::TooLong { max: 4, .. })
        ));
        assert!(matches!(
            store.write("NAME", PvValue::from("toolong")),
            Err(PvError::WriteRejected { .. })
        ));
    }

    #[test]
    fn update_if_differs_reports_change() {
        let store = store_with_defaults();
        assert!(!store.update_if_differs("X:REQ", PvValue::Int(0)).unwrap());
        assert!(store.update_if_differs("X:REQ", PvValue::from(true)).unwrap());
        assert!(!store.update_if_differs("X:REQ", PvValue::Enum(1)).unwrap());
    }

    #[test]
    fn missing_pv_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(
            store.read("nope").unwrap_err(),
            PvError::NotFound("nope".to_string())
        );
        assert!(!store.contains("nope"));
        assert!(store.is_empty());
    }
}
