//! System-wide constants for the simioc workspace.
//!
//! Single source of truth for tick rates, routing dimensions and defaults
//! shared between the simulators and the IOC assemblies.

use std::time::Duration;

/// Default motor record tick rate.
pub const MOTOR_TICK_RATE_HZ: f64 = 10.0;

/// BTPS recomputation period (the `SimEnable` scan).
pub const BTPS_PERIOD: Duration = Duration::from_secs(1);

/// Heartbeat beat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(500);

/// AreaDetector stats plugin update period.
pub const CAMERA_PERIOD: Duration = Duration::from_secs(1);

/// Dispersion-scan spectrum playback period.
pub const DSCAN_PERIOD: Duration = Duration::from_millis(200);

/// Default noise amplitude added to played-back spectra.
pub const DEFAULT_SPECTRUM_NOISE: f64 = 1e-6;

/// Poll period for devices driven purely by setpoint writes.
pub const POLL_PERIOD: Duration = Duration::from_millis(100);

/// Number of BTPS destinations.
pub const NUM_DESTINATIONS: usize = 14;

/// Laser source indices routed by the BTPS.
pub const LASER_SOURCES: [u8; 3] = [1, 5, 8];

/// Default half-width of a nominal range check.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Setpoint/readback differences at or below this are "in position".
pub const MOTION_EPSILON: f64 = 1e-9;

/// Lower bound applied to motor resolution before deriving raw counts.
pub const MIN_RESOLUTION: f64 = 1e-10;

/// Maximum length of string PVs.
pub const MAX_STRING_LENGTH: usize = 255;

/// Default PV prefix when neither CLI nor config provides one.
pub const DEFAULT_PREFIX: &str = "SIM:";

/// Default service name.
pub const DEFAULT_SERVICE_NAME: &str = "simioc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MOTOR_TICK_RATE_HZ > 0.0);
        assert!(HEARTBEAT_PERIOD < BTPS_PERIOD);
        assert!(MIN_RESOLUTION < MOTION_EPSILON);
        assert_eq!(LASER_SOURCES.len(), 3);
        assert!(LASER_SOURCES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn destination_indices_fit_two_digits() {
        // PV names format destinations as DEST:NN.
        assert!(NUM_DESTINATIONS < 100);
    }
}
