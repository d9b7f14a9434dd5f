//! Motor status word (MSTA) and soft-limit evaluation.

use bitflags::bitflags;

use super::axis::MotorOutputs;

bitflags! {
    /// Motor record MSTA bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MotorStatus: u32 {
        /// Last move was in the positive direction.
        const DIRECTION    = 0x0001;
        /// Motion is complete.
        const DONE         = 0x0002;
        /// Plus limit switch (reported for high soft limit).
        const PLUS_LS      = 0x0004;
        /// Home limit switch.
        const HOMELS       = 0x0008;
        /// Closed-loop position control enabled.
        const POSITION     = 0x0020;
        /// Slip/stall detected.
        const SLIP_STALL   = 0x0040;
        /// At home position.
        const HOME         = 0x0080;
        /// Encoder present.
        const PRESENT      = 0x0100;
        /// Driver error.
        const PROBLEM      = 0x0200;
        /// Moving.
        const MOVING       = 0x0400;
        /// Gain support.
        const GAIN_SUPPORT = 0x0800;
        /// Communication error.
        const COMM_ERR     = 0x1000;
        /// Minus limit switch (reported for low soft limit).
        const MINUS_LS     = 0x2000;
        /// Axis has been homed.
        const HOMED        = 0x4000;
    }
}

/// User soft limits. `low == high` disables them, as in the motor record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLimits {
    /// LLM.
    pub low: f64,
    /// HLM.
    pub high: f64,
}

impl SoftLimits {
    /// Are the limits active?
    pub fn enabled(&self) -> bool {
        self.low != self.high
    }

    /// Position is at or beyond the high limit.
    pub fn at_high(&self, position: f64) -> bool {
        self.enabled() && position >= self.high
    }

    /// Position is at or beyond the low limit.
    pub fn at_low(&self, position: f64) -> bool {
        self.enabled() && position <= self.low
    }

    /// Setpoint would violate the limits (LVIO).
    pub fn violated_by(&self, setpoint: f64) -> bool {
        self.enabled() && (setpoint > self.high || setpoint < self.low)
    }
}

impl MotorStatus {
    /// Status word after a tick.
    pub fn from_outputs(out: &MotorOutputs, limits: &SoftLimits) -> Self {
        let mut status = MotorStatus::PRESENT;
        status.set(MotorStatus::DIRECTION, out.direction_positive);
        status.set(MotorStatus::DONE, out.done);
        status.set(MotorStatus::MOVING, out.moving);
        status.set(MotorStatus::PLUS_LS, limits.at_high(out.readback));
        status.set(MotorStatus::MINUS_LS, limits.at_low(out.readback));
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(readback: f64, moving: bool) -> MotorOutputs {
        MotorOutputs {
            readback,
            raw_readback: 0.0,
            moving,
            done: !moving,
            direction_positive: true,
            setpoint_override: None,
            clear_stop: false,
        }
    }

    #[test]
    fn idle_status() {
        let limits = SoftLimits { low: 0.0, high: 100.0 };
        let status = MotorStatus::from_outputs(&outputs(50.0, false), &limits);
        assert!(status.contains(MotorStatus::DONE | MotorStatus::PRESENT | MotorStatus::DIRECTION));
        assert!(!status.intersects(MotorStatus::MOVING | MotorStatus::PLUS_LS | MotorStatus::MINUS_LS));
    }

    #[test]
    fn limit_bits_follow_readback() {
        let limits = SoftLimits { low: 0.0, high: 100.0 };
        let high = MotorStatus::from_outputs(&outputs(100.0, true), &limits);
        assert!(high.contains(MotorStatus::PLUS_LS | MotorStatus::MOVING));
        let low = MotorStatus::from_outputs(&outputs(-1.0, false), &limits);
        assert!(low.contains(MotorStatus::MINUS_LS));
    }

    #[test]
    fn equal_limits_disable_checks() {
        let limits = SoftLimits { low: 0.0, high: 0.0 };
        assert!(!limits.enabled());
        assert!(!limits.violated_by(1e9));
        let status = MotorStatus::from_outputs(&outputs(0.0, false), &limits);
        assert!(!status.intersects(MotorStatus::PLUS_LS | MotorStatus::MINUS_LS));
    }

    #[test]
    fn violation_is_strict() {
        let limits = SoftLimits { low: 400.0, high: 1446.53 };
        assert!(!limits.violated_by(400.0));
        assert!(limits.violated_by(399.9));
        assert!(limits.violated_by(1500.0));
    }
}
