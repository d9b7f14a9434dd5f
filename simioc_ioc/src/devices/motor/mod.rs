//! Simulated motor records.
//!
//! - [`axis`] - Store-independent motion state machine
//! - [`record`] - PV layout and record variants
//! - [`status`] - MSTA bits and soft limits
//!
//! [`MotorTask`] binds one record to the store: it samples VAL, VELO, STOP,
//! SPMG/SPG and MRES, advances the simulator and publishes the readbacks.

pub mod axis;
pub mod record;
pub mod status;

use simioc_common::pv::{PvValue, ValueStore};
use simioc_common::sim::{SimError, SimTask};
use std::time::Duration;
use tracing::debug;

pub use axis::{MotorInputs, MotorOutputs, MotorSimulator, SpmgMode};
pub use record::{MotorDefaults, MotorKind, MotorRecord, attocube_schema};
pub use status::{MotorStatus, SoftLimits};

/// Map an SPMG or SPG enum name to a mode.
pub fn parse_mode(name: &str) -> SpmgMode {
    match name.to_ascii_uppercase().as_str() {
        "STOP" => SpmgMode::Stop,
        "PAUSE" => SpmgMode::Pause,
        _ => SpmgMode::Go,
    }
}

/// Combine SPMG and SPG: the more restrictive mode wins.
fn combine(a: SpmgMode, b: SpmgMode) -> SpmgMode {
    match (a, b) {
        (SpmgMode::Stop, _) | (_, SpmgMode::Stop) => SpmgMode::Stop,
        (SpmgMode::Pause, _) | (_, SpmgMode::Pause) => SpmgMode::Pause,
        _ => SpmgMode::Go,
    }
}

/// Periodic task driving one motor record.
pub struct MotorTask {
    record: MotorRecord,
    defaults: MotorDefaults,
    sim: MotorSimulator,
    seen_generation: u64,
}

impl MotorTask {
    /// Task for `record`, starting from `defaults`.
    pub fn new(record: MotorRecord, defaults: MotorDefaults) -> Self {
        let sim = MotorSimulator::new(defaults.position, defaults.tick_rate_hz, defaults.resolution);
        Self {
            record,
            defaults,
            sim,
            seen_generation: 0,
        }
    }

    /// The record this task drives.
    pub fn record(&self) -> &MotorRecord {
        &self.record
    }

    fn read_inputs(&self, store: &dyn ValueStore) -> Result<(MotorInputs, u64), SimError> {
        let val = store.read(&self.record.val())?;
        let setpoint = val.value.as_f64().unwrap_or(self.sim.readback());

        let mut mode = parse_mode(&store.read_enum_name(&self.record.field("SPMG"))?);
        if let Some(spg) = self.record.spg() {
            mode = combine(mode, parse_mode(&store.read_enum_name(&spg)?));
        }

        let inputs = MotorInputs {
            setpoint,
            new_position: val.generation != self.seen_generation,
            velocity: store.read_f64(&self.record.field("VELO"))?,
            stop: store.read_bool(&self.record.field("STOP"))?,
            mode,
        };
        Ok((inputs, val.generation))
    }

    fn publish(&self, store: &dyn ValueStore, out: &MotorOutputs, setpoint: f64) -> Result<(), SimError> {
        let r = &self.record;

        if let Some(sp) = out.setpoint_override {
            store.post(&r.val(), PvValue::Double(sp))?;
        }
        if out.clear_stop {
            store.post(&r.field("STOP"), PvValue::Int(0))?;
        }

        store.update_if_differs(&r.rbv(), PvValue::Double(out.readback))?;
        store.update_if_differs(&r.field("DRBV"), PvValue::Double(out.readback))?;
        store.update_if_differs(&r.field("RRBV"), PvValue::Int(out.raw_readback.round() as i64))?;
        store.update_if_differs(&r.field("MOVN"), PvValue::from(out.moving))?;
        store.update_if_differs(&r.field("DMOV"), PvValue::from(out.done))?;

        let limits = SoftLimits {
            low: store.read_f64(&r.field("LLM"))?,
            high: store.read_f64(&r.field("HLM"))?,
        };
        let status = MotorStatus::from_outputs(out, &limits);
        let setpoint = out.setpoint_override.unwrap_or(setpoint);
        store.update_if_differs(&r.field("MSTA"), PvValue::Int(i64::from(status.bits())))?;
        store.update_if_differs(&r.field("HLS"), PvValue::from(limits.at_high(out.readback)))?;
        store.update_if_differs(&r.field("LLS"), PvValue::from(limits.at_low(out.readback)))?;
        store.update_if_differs(&r.field("LVIO"), PvValue::from(limits.violated_by(setpoint)))?;
        Ok(())
    }

    fn post_position(&self, store: &dyn ValueStore, position: f64) -> Result<(), SimError> {
        let r = &self.record;
        store.post(&r.val(), PvValue::Double(position))?;
        store.post(&r.rbv(), PvValue::Double(position))?;
        store.post(&r.field("DRBV"), PvValue::Double(position))?;
        store.post(
            &r.field("RRBV"),
            PvValue::Int(self.sim.raw_for(position).round() as i64),
        )?;
        Ok(())
    }
}

impl SimTask for MotorTask {
    fn name(&self) -> &str {
        self.record.prefix()
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(self.sim.dwell())
    }

    fn startup(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        for field in self.record.precision_fields() {
            store.set_precision(&field, self.defaults.precision)?;
        }
        self.post_position(store, self.sim.readback())?;
        self.seen_generation = store.generation(&self.record.val())?;
        debug!(
            "Motor {} ready at {} {}",
            self.record.prefix(),
            self.sim.readback(),
            self.defaults.egu
        );
        Ok(())
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        let (inputs, generation) = self.read_inputs(store)?;
        self.sim
            .set_resolution(store.read_f64(&self.record.field("MRES"))?);

        let out = self.sim.tick(&inputs);
        self.publish(store, &out, inputs.setpoint)?;

        if !out.moving {
            self.seen_generation = generation;
        }
        Ok(())
    }

    fn state_key(&self) -> Option<&str> {
        Some(self.record.prefix())
    }

    fn snapshot_position(&self, store: &dyn ValueStore) -> Option<f64> {
        store.read_f64(&self.record.rbv()).ok()
    }

    fn restore_position(&mut self, store: &dyn ValueStore, position: f64) -> Result<(), SimError> {
        self.sim.reset_position(position);
        self.post_position(store, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simioc_common::pv::MemoryStore;

    fn setup(kind: MotorKind, defaults: MotorDefaults) -> (MemoryStore, MotorTask) {
        let store = MemoryStore::new();
        let record = MotorRecord::new("TST:m1", kind);
        record.schema(&defaults).register_into(&store).unwrap();
        let mut task = MotorTask::new(record, defaults);
        task.startup(&store).unwrap();
        (store, task)
    }

    #[test]
    fn parse_mode_accepts_both_spellings() {
        assert_eq!(parse_mode("Stop"), SpmgMode::Stop);
        assert_eq!(parse_mode("PAUSE"), SpmgMode::Pause);
        assert_eq!(parse_mode("Move"), SpmgMode::Go);
        assert_eq!(parse_mode("GO"), SpmgMode::Go);
        assert_eq!(combine(SpmgMode::Go, SpmgMode::Pause), SpmgMode::Pause);
        assert_eq!(combine(SpmgMode::Pause, SpmgMode::Stop), SpmgMode::Stop);
    }

    #[test]
    fn startup_broadcasts_precision() {
        let (store, _task) = setup(MotorKind::Plain, MotorDefaults::default().with_precision(5));
        assert_eq!(store.read("TST:m1.VELO").unwrap().metadata.precision, Some(5));
        assert_eq!(store.read("TST:m1.RBV").unwrap().metadata.precision, Some(5));
    }

    #[test]
    fn rewrite_of_same_setpoint_retriggers() {
        let (store, mut task) = setup(MotorKind::Plain, MotorDefaults::default());
        task.tick(&store).unwrap();
        assert_eq!(store.read_i64("TST:m1.DMOV").unwrap(), 1);

        store.write("TST:m1", PvValue::Double(0.0)).unwrap();
        task.tick(&store).unwrap();
        // Zero-length move completes on the same tick.
        assert_eq!(store.read_i64("TST:m1.DMOV").unwrap(), 1);
        assert_eq!(store.read_f64("TST:m1.RBV").unwrap(), 0.0);
    }

    #[test]
    fn stop_field_is_cleared_and_setpoint_follows() {
        let (store, mut task) = setup(MotorKind::Plain, MotorDefaults::default().with_velocity(10.0));
        store.write("TST:m1", PvValue::Double(10.0)).unwrap();
        task.tick(&store).unwrap();
        task.tick(&store).unwrap();
        assert_eq!(store.read_f64("TST:m1.RBV").unwrap(), 2.0);

        store.write("TST:m1.STOP", PvValue::Int(1)).unwrap();
        task.tick(&store).unwrap();
        assert_eq!(store.read_i64("TST:m1.STOP").unwrap(), 0);
        assert_eq!(store.read_f64("TST:m1").unwrap(), 2.0);
        assert_eq!(store.read_i64("TST:m1.MOVN").unwrap(), 0);
        assert_eq!(store.read_i64("TST:m1.DMOV").unwrap(), 1);
    }

    #[test]
    fn xps_spg_pause_holds() {
        let (store, mut task) = setup(MotorKind::Xps, MotorDefaults::default().with_velocity(10.0));
        store.write("TST:m1", PvValue::Double(10.0)).unwrap();
        task.tick(&store).unwrap();
        store.write("TST:m1.SPG", PvValue::from("PAUSE")).unwrap();
        for _ in 0..3 {
            task.tick(&store).unwrap();
        }
        assert_eq!(store.read_f64("TST:m1.RBV").unwrap(), 1.0);
        assert_eq!(store.read_i64("TST:m1.MOVN").unwrap(), 1);

        store.write("TST:m1.SPG", PvValue::from("GO")).unwrap();
        task.tick(&store).unwrap();
        assert_eq!(store.read_f64("TST:m1.RBV").unwrap(), 2.0);
    }

    #[test]
    fn status_word_and_limit_violation() {
        let (store, mut task) = setup(MotorKind::Plain, MotorDefaults::default().with_limits(0.0, 1.0));
        store.write("TST:m1", PvValue::Double(5.0)).unwrap();
        task.tick(&store).unwrap();

        let msta = store.read_i64("TST:m1.MSTA").unwrap() as u32;
        let status = MotorStatus::from_bits_truncate(msta);
        assert!(status.contains(MotorStatus::MOVING | MotorStatus::DIRECTION));
        assert_eq!(store.read_i64("TST:m1.LVIO").unwrap(), 1);
    }

    #[test]
    fn infinite_setpoint_is_refused_and_motor_recovers() {
        let (store, mut task) = setup(MotorKind::Plain, MotorDefaults::default().with_velocity(10.0));
        store.write("TST:m1", PvValue::Double(f64::INFINITY)).unwrap();
        task.tick(&store).unwrap();
        assert_eq!(store.read_f64("TST:m1").unwrap(), 0.0);
        assert_eq!(store.read_f64("TST:m1.RBV").unwrap(), 0.0);
        assert_eq!(store.read_i64("TST:m1.MOVN").unwrap(), 0);

        store.write("TST:m1", PvValue::Double(1.0)).unwrap();
        for _ in 0..50 {
            task.tick(&store).unwrap();
        }
        assert_eq!(store.read_f64("TST:m1.RBV").unwrap(), 1.0);
        assert_eq!(store.read_i64("TST:m1.MOVN").unwrap(), 0);
        assert_eq!(store.read_i64("TST:m1.DMOV").unwrap(), 1);
    }

    #[test]
    fn restore_moves_all_readbacks() {
        let (store, mut task) = setup(MotorKind::Plain, MotorDefaults::default());
        task.restore_position(&store, 12.5).unwrap();
        assert_eq!(store.read_f64("TST:m1").unwrap(), 12.5);
        assert_eq!(store.read_f64("TST:m1.DRBV").unwrap(), 12.5);
        assert_eq!(task.snapshot_position(&store), Some(12.5));
        assert_eq!(task.state_key(), Some("TST:m1"));

        task.tick(&store).unwrap();
        assert_eq!(store.read_i64("TST:m1.MOVN").unwrap(), 0);
    }
}
