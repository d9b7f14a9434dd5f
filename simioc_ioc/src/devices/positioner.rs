//! Beckhoff axes: motor record, PLC error block and TwinCAT state
//! positioner.

use simioc_common::consts::POLL_PERIOD;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::{MotorConfig, SimError, SimTask};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::devices::motor::{MotorDefaults, MotorKind, MotorRecord, MotorTask};

/// Time a state move takes.
pub const STATE_MOVE_DELAY: Duration = Duration::from_millis(200);

/// Number of configured states.
pub const NUM_STATES: u8 = 6;

/// Initial state ("out").
const INITIAL_STATE: i64 = 1;

/// TwinCAT state positioner PVs (`GET_RBV`, `SET`, `BUSY_RBV`, ...).
#[derive(Debug, Clone)]
pub struct StatePositioner {
    prefix: String,
    delay: Duration,
    seen_generation: u64,
    pending: Option<(i64, Instant)>,
}

impl StatePositioner {
    /// Positioner under `prefix` (e.g. `MMS:01:STATE:`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delay: STATE_MOVE_DELAY,
            seen_generation: 0,
            pending: None,
        }
    }

    /// Override the move delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `GET_RBV`.
    pub fn state_pv(&self) -> String {
        self.pv("GET_RBV")
    }

    /// `SET`.
    pub fn set_pv(&self) -> String {
        self.pv("SET")
    }

    /// `BUSY_RBV`.
    pub fn busy_pv(&self) -> String {
        self.pv("BUSY_RBV")
    }

    /// `DONE_RBV`.
    pub fn done_pv(&self) -> String {
        self.pv("DONE_RBV")
    }

    /// PV schema, including the state configuration blocks `01:`..`06:`.
    pub fn schema(&self) -> PvSchema {
        let rw = PvMetadata::new();
        let mut schema = PvSchema::new();
        schema
            .add(self.state_pv(), 0, rw.clone())
            .add(self.set_pv(), 0, rw.clone())
            .add(self.pv("ERR_RBV"), 0.0, rw.clone())
            .add(self.pv("ERRID_RBV"), 0, rw.clone())
            .add(self.pv("ERRMSG_RBV"), "", rw.clone())
            .add(self.busy_pv(), 0, rw.clone())
            .add(self.done_pv(), 0, rw.clone())
            .pair(self.pv("RESET"), 0, rw.clone());

        for state in 1..=NUM_STATES {
            let cfg = |suffix: &str| self.pv(&format!("{state:02}:{suffix}"));
            schema.add(cfg("NAME_RBV"), "", rw.clone());
            for setting in ["SETPOINT", "DELTA", "VELO", "ACCL", "DCCL"] {
                schema.pair(cfg(setting), 0.0, rw.clone());
            }
            schema
                .add(cfg("MOVE_OK_RBV"), 0, rw.clone())
                .add(cfg("LOCKED_RBV"), 0, rw.clone())
                .add(cfg("VALID_RBV"), 0, rw.clone());
        }
        schema
    }
}

impl SimTask for StatePositioner {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn period(&self) -> Duration {
        POLL_PERIOD
    }

    fn startup(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        store.post(&self.state_pv(), PvValue::Int(INITIAL_STATE))?;
        self.seen_generation = store.generation(&self.set_pv())?;
        Ok(())
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        if let Some((target, due)) = self.pending {
            if Instant::now() >= due {
                store.post(&self.state_pv(), PvValue::Int(target))?;
                store.post(&self.busy_pv(), PvValue::Int(0))?;
                store.post(&self.done_pv(), PvValue::Int(1))?;
                self.pending = None;
                debug!("{} reached state {}", self.prefix, target);
            }
            return Ok(());
        }

        let set = store.read(&self.set_pv())?;
        if set.generation != self.seen_generation {
            self.seen_generation = set.generation;
            let target = set.value.as_i64().unwrap_or(0);
            store.post(&self.busy_pv(), PvValue::Int(1))?;
            store.post(&self.state_pv(), PvValue::Int(0))?;
            self.pending = Some((target, Instant::now() + self.delay));
        }
        Ok(())
    }
}

/// PLC error block of a Beckhoff axis.
fn plc_schema(prefix: &str) -> PvSchema {
    let pv = |suffix: &str| format!("{prefix}{suffix}");
    let mut schema = PvSchema::new();
    schema
        .add(
            pv("sErrorMessage_RBV"),
            "No error",
            PvMetadata::new().max_length(80),
        )
        .add(pv("nErrorId_RBV"), 0, PvMetadata::new())
        .pair_named(pv("bReset"), pv("bReset_RBV"), 0, PvMetadata::new());
    schema
}

/// Motor record, PLC block and state positioner sharing one prefix.
#[derive(Debug, Clone)]
pub struct BeckhoffAxis {
    prefix: String,
    motor: MotorRecord,
    defaults: MotorDefaults,
    state: StatePositioner,
}

impl BeckhoffAxis {
    /// Axis under `prefix` (e.g. `AT2L0:XTES:MMS:01`).
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            motor: MotorRecord::new(prefix.clone(), MotorKind::Plain),
            defaults: MotorDefaults::default().with_velocity(2.0),
            state: StatePositioner::new(format!("{prefix}:STATE:")),
            prefix,
        }
    }

    /// Axis prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Apply motor configuration overrides.
    pub fn apply(mut self, config: &MotorConfig) -> Self {
        self.defaults = self.defaults.apply(config);
        self
    }

    /// PV schema of all parts.
    pub fn schema(&self) -> PvSchema {
        let mut schema = self.motor.schema(&self.defaults);
        schema
            .extend(plc_schema(&format!("{}:PLC:", self.prefix)))
            .extend(self.state.schema());
        schema
    }

    /// The motor and state positioner tasks.
    pub fn into_tasks(self) -> Vec<Box<dyn SimTask>> {
        vec![
            Box::new(MotorTask::new(self.motor, self.defaults)),
            Box::new(self.state),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simioc_common::pv::MemoryStore;

    #[test]
    fn set_goes_through_unknown_state() {
        let store = MemoryStore::new();
        let mut pos = StatePositioner::new("MMS:01:STATE:").with_delay(Duration::ZERO);
        pos.schema().register_into(&store).unwrap();
        pos.startup(&store).unwrap();
        assert_eq!(store.read_i64("MMS:01:STATE:GET_RBV").unwrap(), 1);

        pos.tick(&store).unwrap();
        assert_eq!(store.read_i64("MMS:01:STATE:BUSY_RBV").unwrap(), 0);

        store.write("MMS:01:STATE:SET", PvValue::Int(2)).unwrap();
        pos.tick(&store).unwrap();
        assert_eq!(store.read_i64("MMS:01:STATE:GET_RBV").unwrap(), 0);
        assert_eq!(store.read_i64("MMS:01:STATE:BUSY_RBV").unwrap(), 1);

        pos.tick(&store).unwrap();
        assert_eq!(store.read_i64("MMS:01:STATE:GET_RBV").unwrap(), 2);
        assert_eq!(store.read_i64("MMS:01:STATE:BUSY_RBV").unwrap(), 0);
        assert_eq!(store.read_i64("MMS:01:STATE:DONE_RBV").unwrap(), 1);
    }

    #[test]
    fn state_waits_for_delay() {
        let store = MemoryStore::new();
        let mut pos = StatePositioner::new("S:").with_delay(Duration::from_secs(3600));
        pos.schema().register_into(&store).unwrap();
        pos.startup(&store).unwrap();

        store.write("S:SET", PvValue::Int(3)).unwrap();
        pos.tick(&store).unwrap();
        pos.tick(&store).unwrap();
        assert_eq!(store.read_i64("S:GET_RBV").unwrap(), 0);
        assert_eq!(store.read_i64("S:BUSY_RBV").unwrap(), 1);
    }

    #[test]
    fn beckhoff_axis_layout() {
        let axis = BeckhoffAxis::new("AT2L0:XTES:MMS:01");
        let schema = axis.schema();
        assert!(schema.contains("AT2L0:XTES:MMS:01.RBV"));
        assert!(schema.contains("AT2L0:XTES:MMS:01:PLC:bReset_RBV"));
        assert!(schema.contains("AT2L0:XTES:MMS:01:STATE:06:DCCL_RBV"));

        let store = MemoryStore::new();
        schema.register_into(&store).unwrap();
        assert_eq!(store.read_f64("AT2L0:XTES:MMS:01.VELO").unwrap(), 2.0);
        assert_eq!(
            store.read_string("AT2L0:XTES:MMS:01:PLC:sErrorMessage_RBV").unwrap(),
            "No error"
        );
        assert_eq!(axis.into_tasks().len(), 2);
    }
}
