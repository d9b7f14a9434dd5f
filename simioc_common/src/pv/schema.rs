//! Declarative PV schemas.
//!
//! Each device type builds a [`PvSchema`] listing the PVs it owns; IOC
//! assemblies concatenate schemas and register them into the store before
//! any task starts.

use super::metadata::PvMetadata;
use super::store::{PvError, ValueStore};
use super::value::PvValue;

/// Suffix appended to a setpoint name to form its readback.
pub const RBV_SUFFIX: &str = "_RBV";

/// One PV to register.
#[derive(Debug, Clone, PartialEq)]
pub struct PvSpec {
    /// Full PV name.
    pub name: String,
    /// Initial value; fixes the PV kind.
    pub initial: PvValue,
    /// Metadata.
    pub metadata: PvMetadata,
    /// Readback mirrored from this PV on external writes.
    pub readback: Option<String>,
}

/// Ordered collection of [`PvSpec`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PvSchema {
    specs: Vec<PvSpec>,
}

impl PvSchema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single PV.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        initial: impl Into<PvValue>,
        metadata: PvMetadata,
    ) -> &mut Self {
        self.specs.push(PvSpec {
            name: name.into(),
            initial: initial.into(),
            metadata,
            readback: None,
        });
        self
    }

    /// Add a setpoint `name` and its read-only readback `name_RBV`.
    pub fn pair(
        &mut self,
        name: impl Into<String>,
        initial: impl Into<PvValue>,
        metadata: PvMetadata,
    ) -> &mut Self {
        let name = name.into();
        let readback = format!("{name}{RBV_SUFFIX}");
        self.pair_named(name, readback, initial, metadata)
    }

    /// Add a setpoint/readback pair with an explicit readback name.
    pub fn pair_named(
        &mut self,
        setpoint: impl Into<String>,
        readback: impl Into<String>,
        initial: impl Into<PvValue>,
        metadata: PvMetadata,
    ) -> &mut Self {
        let setpoint = setpoint.into();
        let readback = readback.into();
        let initial = initial.into();
        self.specs.push(PvSpec {
            name: setpoint,
            initial: initial.clone(),
            metadata: metadata.clone(),
            readback: Some(readback.clone()),
        });
        self.specs.push(PvSpec {
            name: readback,
            initial,
            metadata: metadata.read_only(),
            readback: None,
        });
        self
    }

    /// Append all PVs of `other`.
    pub fn extend(&mut self, other: PvSchema) -> &mut Self {
        self.specs.extend(other.specs);
        self
    }

    /// Register every PV (then every readback link) into `store`.
    pub fn register_into(&self, store: &dyn ValueStore) -> Result<(), PvError> {
        for spec in &self.specs {
            store.register(&spec.name, spec.initial.clone(), spec.metadata.clone())?;
        }
        for spec in &self.specs {
            if let Some(readback) = &spec.readback {
                store.link_readback(&spec.name, readback)?;
            }
        }
        Ok(())
    }

    /// Iterate over specs.
    pub fn iter(&self) -> impl Iterator<Item = &PvSpec> {
        self.specs.iter()
    }

    /// Does the schema define `name`?
    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name == name)
    }

    /// Number of PVs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
