//! IOC registry.
//!
//! Maps IOC names to factories that assemble the IOC's PV schema, periodic
//! tasks and startup hooks. The registry is built at startup and passed by
//! value; there is no global state.

use simioc_common::pv::PvSchema;
use simioc_common::sim::{IocConfig, SimError, SimTask, StartupHook};
use std::collections::HashMap;
use std::fmt;

/// Everything an IOC contributes to the scheduler.
#[derive(Default)]
pub struct IocAssembly {
    /// PVs to register before any task starts
    pub schema: PvSchema,
    /// Periodic tasks
    pub tasks: Vec<Box<dyn SimTask>>,
    /// Named one-shot hooks, run in order after registration
    pub startup: Vec<(String, StartupHook)>,
}

impl IocAssembly {
    /// Empty assembly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append PVs.
    pub fn add_schema(&mut self, schema: PvSchema) -> &mut Self {
        self.schema.extend(schema);
        self
    }

    /// Add a periodic task.
    pub fn add_task(&mut self, task: impl SimTask + 'static) -> &mut Self {
        self.tasks.push(Box::new(task));
        self
    }

    /// Add a startup hook.
    pub fn add_startup(&mut self, name: impl Into<String>, hook: StartupHook) -> &mut Self {
        self.startup.push((name.into(), hook));
        self
    }
}

impl fmt::Debug for IocAssembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tasks: Vec<&str> = self.tasks.iter().map(|t| t.name()).collect();
        let hooks: Vec<&str> = self.startup.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("IocAssembly")
            .field("pvs", &self.schema.len())
            .field("tasks", &tasks)
            .field("startup", &hooks)
            .finish()
    }
}

/// Builds an IOC for a resolved PV prefix.
pub type IocFactory = fn(prefix: &str, config: &IocConfig) -> Result<IocAssembly, SimError>;

/// A registered IOC.
#[derive(Debug, Clone, Copy)]
pub struct IocEntry {
    /// Assembly factory
    pub factory: IocFactory,
    /// Prefix used when neither CLI nor config sets one
    pub default_prefix: &'static str,
    /// One-line description for `--list`
    pub description: &'static str,
}

/// Registry of available IOCs.
pub struct IocRegistry {
    entries: HashMap<&'static str, IocEntry>,
}

impl IocRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding every built-in IOC.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::iocs::register_all(&mut registry);
        registry
    }

    /// Register an IOC.
    ///
    /// # Panics
    /// Panics if an IOC with the same name is already registered.
    pub fn register(&mut self, name: &'static str, entry: IocEntry) {
        if self.entries.contains_key(name) {
            panic!("IOC '{name}' is already registered");
        }
        self.entries.insert(name, entry);
    }

    /// Get an IOC entry by name.
    pub fn get(&self, name: &str) -> Option<&IocEntry> {
        self.entries.get(name)
    }

    /// Assemble IOC `name`, resolving its prefix from `config` and falling
    /// back to the IOC's default prefix.
    ///
    /// # Errors
    /// Returns `SimError::IocNotFound` for an unknown name and
    /// `SimError::Configuration` when the prefix does not expand.
    pub fn create(&self, name: &str, config: &IocConfig) -> Result<(String, IocAssembly), SimError> {
        let entry = self
            .get(name)
            .ok_or_else(|| SimError::IocNotFound(name.to_string()))?;
        let prefix = config.resolve_prefix(entry.default_prefix)?;
        let assembly = (entry.factory)(&prefix, config)?;
        Ok((prefix, assembly))
    }

    /// Registered IOCs with their descriptions, sorted by name.
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        let mut list: Vec<_> = self
            .entries
            .iter()
            .map(|(name, entry)| (*name, entry.description))
            .collect();
        list.sort();
        list
    }
}

impl Default for IocRegistry {
    fn default() -> Self {
        Self::new()
    }
}
