//! Minimal AreaDetector stats plugin.
//!
//! While `SimEnable` is non-zero the plugin bumps `ArrayCounter_RBV` once
//! per period and publishes uniform random centroid and total values.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use simioc_common::consts::CAMERA_PERIOD;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::{SimError, SimTask};
use std::time::Duration;

/// PV names of one stats plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsPlugin {
    prefix: String,
}

impl StatsPlugin {
    /// Plugin under `prefix` (e.g. `LAS:LHN:BAY1:CAM:01:Stats2:`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Device prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `SimEnable`.
    pub fn enable(&self) -> String {
        self.pv("SimEnable")
    }

    /// `ArrayCounter_RBV`.
    pub fn array_counter(&self) -> String {
        self.pv("ArrayCounter_RBV")
    }

    /// `CentroidX_RBV`.
    pub fn centroid_x(&self) -> String {
        self.pv("CentroidX_RBV")
    }

    /// `CentroidY_RBV`.
    pub fn centroid_y(&self) -> String {
        self.pv("CentroidY_RBV")
    }

    /// `Total_RBV`.
    pub fn total(&self) -> String {
        self.pv("Total_RBV")
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let ro = PvMetadata::new().read_only();
        let mut schema = PvSchema::new();
        schema
            .add(self.enable(), 1, PvMetadata::new().doc("Enable the simulated frames"))
            .add(self.array_counter(), 0, ro.clone())
            .add(self.centroid_x(), 0.0, ro.clone())
            .add(self.centroid_y(), 0.0, ro.clone())
            .add(self.total(), 0.0, ro);
        schema
    }
}

/// Periodic task producing frames for one [`StatsPlugin`].
pub struct StatsPluginTask {
    plugin: StatsPlugin,
    period: Duration,
    rng: StdRng,
}

impl StatsPluginTask {
    /// Task with an entropy-seeded generator.
    pub fn new(plugin: StatsPlugin) -> Self {
        Self::with_rng(plugin, StdRng::from_entropy())
    }

    /// Task with a fixed seed, for reproducible runs.
    pub fn seeded(plugin: StatsPlugin, seed: u64) -> Self {
        Self::with_rng(plugin, StdRng::seed_from_u64(seed))
    }

    fn with_rng(plugin: StatsPlugin, rng: StdRng) -> Self {
        Self {
            plugin,
            period: CAMERA_PERIOD,
            rng,
        }
    }
}

impl SimTask for StatsPluginTask {
    fn name(&self) -> &str {
        self.plugin.prefix()
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        if !store.read_bool(&self.plugin.enable())? {
            return Ok(());
        }

        let counter = store.read_i64(&self.plugin.array_counter())?;
        store.post(&self.plugin.array_counter(), PvValue::Int(counter.wrapping_add(1)))?;
        store.post(&self.plugin.centroid_x(), PvValue::Double(self.rng.gen_range(0.0..1.0)))?;
        store.post(&self.plugin.centroid_y(), PvValue::Double(self.rng.gen_range(0.0..1.0)))?;
        store.post(&self.plugin.total(), PvValue::Double(self.rng.gen_range(0.0..1.0)))?;
        Ok(())
    }
}
