//! Motor motion simulator.
//!
//! The `MotorSimulator` reproduces the motor record's constant-velocity move
//! profile, one fixed-length tick at a time:
//!
//! ```text
//!          setpoint differs / new position
//!   IDLE ─────────────────────────────────► MOVING
//!    ▲                                        │
//!    └── all steps done / stop / SPMG Stop ───┘
//! ```
//!
//! A move of `diff` at `velocity` is split into
//! `floor(|diff| / velocity / dwell)` equal steps. Every step tick advances
//! the readback by one step; the tick after the last step forces the
//! readback exactly onto the target and ends the move. A zero-step move
//! snaps on the tick it starts.
//!
//! The simulator is independent of the value store; [`super::MotorTask`]
//! feeds it [`MotorInputs`] and publishes its [`MotorOutputs`].

use simioc_common::consts::{MIN_RESOLUTION, MOTION_EPSILON};
use tracing::{debug, trace, warn};

/// Effective stop-pause-go mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpmgMode {
    /// Abort any move; setpoint follows readback.
    Stop,
    /// Hold the active move in place.
    Pause,
    /// Normal operation.
    #[default]
    Go,
}

/// Inputs sampled from the record at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorInputs {
    /// User setpoint (VAL).
    pub setpoint: f64,
    /// A client wrote VAL since the last completed move.
    pub new_position: bool,
    /// Velocity in EGU/s (VELO).
    pub velocity: f64,
    /// STOP field set.
    pub stop: bool,
    /// Stop-pause-go mode.
    pub mode: SpmgMode,
}

/// What the record should publish after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorOutputs {
    /// User readback (RBV / DRBV).
    pub readback: f64,
    /// Raw readback in steps (RRBV).
    pub raw_readback: f64,
    /// A move is in progress (MOVN).
    pub moving: bool,
    /// Done moving (DMOV).
    pub done: bool,
    /// Last move direction was positive.
    pub direction_positive: bool,
    /// Rewrite VAL to this value (stop, abort or refused move).
    pub setpoint_override: Option<f64>,
    /// Clear the STOP field.
    pub clear_stop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveMove {
    target: f64,
    step: f64,
    total_steps: u64,
    completed: u64,
}

/// Single-axis motion state machine.
#[derive(Debug, Clone)]
pub struct MotorSimulator {
    tick_rate_hz: f64,
    resolution: f64,
    readback: f64,
    direction_positive: bool,
    active: Option<ActiveMove>,
}

impl MotorSimulator {
    /// Create a simulator at rest at `position`.
    pub fn new(position: f64, tick_rate_hz: f64, resolution: f64) -> Self {
        Self {
            tick_rate_hz,
            resolution,
            readback: position,
            direction_positive: true,
            active: None,
        }
    }

    /// Current readback.
    pub fn readback(&self) -> f64 {
        self.readback
    }

    /// Is a move in progress?
    pub fn is_moving(&self) -> bool {
        self.active.is_some()
    }

    /// Tick duration in seconds.
    pub fn dwell(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }

    /// Update the resolution used for the raw readback.
    pub fn set_resolution(&mut self, resolution: f64) {
        self.resolution = resolution;
    }

    /// Teleport to `position`, cancelling any move.
    pub fn reset_position(&mut self, position: f64) {
        self.readback = position;
        self.active = None;
    }

    /// Raw step count for `position`.
    pub fn raw_for(&self, position: f64) -> f64 {
        position / self.resolution.max(MIN_RESOLUTION)
    }

    /// Advance one tick.
    pub fn tick(&mut self, inputs: &MotorInputs) -> MotorOutputs {
        let mut setpoint_override = None;
        let mut clear_stop = false;

        match self.active {
            None => {
                // A stop request while idle is simply acknowledged.
                clear_stop = inputs.stop;
                let diff = inputs.setpoint - self.readback;
                if diff.abs() > MOTION_EPSILON || inputs.new_position {
                    setpoint_override = self.start_move(inputs);
                }
            }
            Some(_) => setpoint_override = self.continue_move(inputs, &mut clear_stop),
        }

        self.outputs(setpoint_override, clear_stop)
    }

    fn start_move(&mut self, inputs: &MotorInputs) -> Option<f64> {
        if !inputs.setpoint.is_finite() {
            warn!("Refusing move to non-finite setpoint {}", inputs.setpoint);
            return Some(self.readback);
        }
        if !(inputs.velocity > 0.0) {
            warn!(
                "Refusing move to {} with non-positive velocity {}",
                inputs.setpoint, inputs.velocity
            );
            return Some(self.readback);
        }

        let diff = inputs.setpoint - self.readback;
        let total_time = diff.abs() / inputs.velocity;
        let total_steps = (total_time / self.dwell()).floor() as u64;
        let step = if total_steps > 0 {
            diff / total_steps as f64
        } else {
            0.0
        };
        self.direction_positive = diff >= 0.0;

        debug!(
            "Move {} -> {} in {} steps of {}",
            self.readback, inputs.setpoint, total_steps, step
        );

        if inputs.mode == SpmgMode::Stop {
            return Some(self.readback);
        }

        if total_steps == 0 {
            self.readback = inputs.setpoint;
            return None;
        }

        self.active = Some(ActiveMove {
            target: inputs.setpoint,
            step,
            total_steps,
            completed: 0,
        });

        // The start tick steps immediately; the stop flag was just consumed.
        if inputs.mode == SpmgMode::Go {
            self.apply_step();
        }
        None
    }

    fn continue_move(&mut self, inputs: &MotorInputs, clear_stop: &mut bool) -> Option<f64> {
        let Some(mv) = self.active else {
            return None;
        };

        if mv.completed >= mv.total_steps {
            self.readback = mv.target;
            self.active = None;
            debug!("Move complete at {}", self.readback);
            return None;
        }

        if inputs.stop {
            *clear_stop = true;
            self.active = None;
            debug!("Stopped at {}", self.readback);
            return Some(self.readback);
        }

        match inputs.mode {
            SpmgMode::Stop => {
                self.active = None;
                debug!("SPMG stop at {}", self.readback);
                Some(self.readback)
            }
            SpmgMode::Pause => None,
            SpmgMode::Go => {
                self.apply_step();
                None
            }
        }
    }

    fn apply_step(&mut self) {
        if let Some(mv) = self.active.as_mut() {
            self.readback += mv.step;
            mv.completed += 1;
            trace!("Step {}/{} readback={}", mv.completed, mv.total_steps, self.readback);
        }
    }

    fn outputs(&self, setpoint_override: Option<f64>, clear_stop: bool) -> MotorOutputs {
        let moving = self.active.is_some();
        MotorOutputs {
            readback: self.readback,
            raw_readback: self.raw_for(self.readback),
            moving,
            done: !moving,
            direction_positive: self.direction_positive,
            setpoint_override,
            clear_stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn go(setpoint: f64, velocity: f64) -> MotorInputs {
        MotorInputs {
            setpoint,
            new_position: true,
            velocity,
            stop: false,
            mode: SpmgMode::Go,
        }
    }

    fn idle(setpoint: f64, velocity: f64) -> MotorInputs {
        MotorInputs {
            new_position: false,
            ..go(setpoint, velocity)
        }
    }

    #[test]
    fn test_fifty_units_at_hundred_per_second() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);

        let out = sim.tick(&go(50.0, 100.0));
        assert_eq!(out.readback, 10.0);
        assert!(out.moving);
        assert!(!out.done);

        let mut readbacks = vec![out.readback];
        for _ in 2..=5 {
            let out = sim.tick(&idle(50.0, 100.0));
            assert!(out.moving);
            readbacks.push(out.readback);
        }
        assert_eq!(readbacks, vec![10.0, 20.0, 30.0, 40.0, 50.0]);

        let out = sim.tick(&idle(50.0, 100.0));
        assert!(!out.moving);
        assert!(out.done);
        assert_eq!(out.readback, 50.0);
        assert_eq!(out.raw_readback, 50.0 / 1e-6);
    }

    #[test]
    fn test_short_move_snaps_in_one_tick() {
        let mut sim = MotorSimulator::new(1.0, 10.0, 1e-6);
        // 0.05 s of travel at 1 unit/s is less than one 0.1 s dwell.
        let out = sim.tick(&go(1.05, 1.0));
        assert_eq!(out.readback, 1.05);
        assert!(!out.moving);
        assert!(out.done);
    }

    #[test]
    fn test_retrigger_with_equal_setpoint() {
        let mut sim = MotorSimulator::new(3.0, 10.0, 1e-6);
        let out = sim.tick(&go(3.0, 1.0));
        assert_eq!(out.readback, 3.0);
        assert!(!out.moving);
        assert_eq!(out.setpoint_override, None);
    }

    #[test]
    fn test_stop_mid_move_holds_readback() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);
        sim.tick(&go(10.0, 10.0));
        sim.tick(&idle(10.0, 10.0));
        let before = sim.readback();
        assert_eq!(before, 2.0);

        let out = sim.tick(&MotorInputs {
            stop: true,
            ..idle(10.0, 10.0)
        });
        assert_eq!(out.readback, before);
        assert!(!out.moving);
        assert!(out.done);
        assert!(out.clear_stop);
        assert_eq!(out.setpoint_override, Some(before));

        // No further steps once the setpoint follows the readback.
        let out = sim.tick(&idle(before, 10.0));
        assert_eq!(out.readback, before);
        assert!(!out.moving);
    }

    #[test]
    fn test_stop_while_idle_is_cleared() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);
        let out = sim.tick(&MotorInputs {
            stop: true,
            ..idle(0.0, 1.0)
        });
        assert!(out.clear_stop);
        assert!(!out.moving);
    }

    #[test]
    fn test_spmg_stop_aborts_without_flag() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);
        sim.tick(&go(5.0, 10.0));
        let out = sim.tick(&MotorInputs {
            mode: SpmgMode::Stop,
            ..idle(5.0, 10.0)
        });
        assert_eq!(out.readback, 1.0);
        assert!(!out.moving);
        assert!(!out.clear_stop);
        assert_eq!(out.setpoint_override, Some(1.0));
    }

    #[test]
    fn test_spmg_stop_blocks_new_moves() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);
        let out = sim.tick(&MotorInputs {
            mode: SpmgMode::Stop,
            ..go(5.0, 10.0)
        });
        assert_eq!(out.readback, 0.0);
        assert_eq!(out.setpoint_override, Some(0.0));
        assert!(!out.moving);
    }

    #[test]
    fn test_pause_holds_then_resumes() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);
        sim.tick(&go(4.0, 10.0));
        assert_eq!(sim.readback(), 1.0);

        let paused = MotorInputs {
            mode: SpmgMode::Pause,
            ..idle(4.0, 10.0)
        };
        for _ in 0..5 {
            let out = sim.tick(&paused);
            assert_eq!(out.readback, 1.0);
            assert!(out.moving);
        }

        for _ in 0..3 {
            sim.tick(&idle(4.0, 10.0));
        }
        assert_eq!(sim.readback(), 4.0);
        let out = sim.tick(&idle(4.0, 10.0));
        assert!(!out.moving);
        assert_eq!(out.readback, 4.0);
    }

    #[test]
    fn test_non_positive_velocity_refuses_move() {
        let mut sim = MotorSimulator::new(2.0, 10.0, 1e-6);
        let out = sim.tick(&go(5.0, 0.0));
        assert_eq!(out.readback, 2.0);
        assert_eq!(out.setpoint_override, Some(2.0));
        assert!(out.done);

        let out = sim.tick(&go(5.0, -1.0));
        assert_eq!(out.setpoint_override, Some(2.0));
    }

    #[test]
    fn test_non_finite_setpoint_refuses_move() {
        let mut sim = MotorSimulator::new(2.0, 10.0, 1e-6);
        for target in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let out = sim.tick(&go(target, 1.0));
            assert_eq!(out.readback, 2.0);
            assert_eq!(out.setpoint_override, Some(2.0));
            assert!(!out.moving);
            assert!(out.done);
        }

        // The next finite setpoint moves normally.
        let out = sim.tick(&go(7.0, 10.0));
        assert!(out.moving);
        assert_eq!(out.readback, 3.0);
    }

    #[test]
    fn test_negative_direction_and_raw_readback() {
        let mut sim = MotorSimulator::new(1.0, 10.0, 0.5);
        let out = sim.tick(&go(0.0, 5.0));
        assert!(!out.direction_positive);
        assert_eq!(out.readback, 0.5);
        assert_eq!(out.raw_readback, 1.0);
    }

    #[test]
    fn test_tiny_resolution_is_clamped() {
        let sim = MotorSimulator::new(0.0, 10.0, 0.0);
        assert_eq!(sim.raw_for(1e-10), 1.0);
    }

    #[test]
    fn test_setpoint_change_during_move_is_deferred() {
        let mut sim = MotorSimulator::new(0.0, 10.0, 1e-6);
        sim.tick(&go(2.0, 10.0));
        // A new target mid-move does not alter the running profile.
        sim.tick(&go(12.0, 10.0));
        assert_eq!(sim.readback(), 2.0);
        let out = sim.tick(&go(12.0, 10.0));
        assert_eq!(out.readback, 2.0);
        assert!(!out.moving);

        // The next tick starts the new move.
        let out = sim.tick(&go(12.0, 10.0));
        assert!(out.moving);
        assert_eq!(out.readback, 3.0);
    }
}
