//! Heartbeat signal.
//!
//! Every period `beat_id` increments. When the pattern entry at
//! `beat_id % len` is non-zero, `heartbeat` is set to `beat_id % 2`;
//! a zero entry skips the beat.

use simioc_common::consts::HEARTBEAT_PERIOD;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::{SimError, SimTask};
use std::time::Duration;

/// Default beat pattern.
pub const DEFAULT_PATTERN: [i64; 6] = [0, 1, 1, 1, 1, 1];

/// Maximum pattern length.
pub const MAX_PATTERN_LENGTH: usize = 1024;

/// Heartbeat PVs and their periodic task.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    prefix: String,
    period: Duration,
}

impl Heartbeat {
    /// Heartbeat under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            period: HEARTBEAT_PERIOD,
        }
    }

    /// `heartbeat`.
    pub fn heartbeat_pv(&self) -> String {
        format!("{}heartbeat", self.prefix)
    }

    /// `beat_id`.
    pub fn beat_id_pv(&self) -> String {
        format!("{}beat_id", self.prefix)
    }

    /// `beat_pattern`.
    pub fn pattern_pv(&self) -> String {
        format!("{}beat_pattern", self.prefix)
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .add(
                self.heartbeat_pv(),
                0,
                PvMetadata::new().read_only().doc("The heartbeat signal"),
            )
            .add(
                self.beat_id_pv(),
                0,
                PvMetadata::new().read_only().doc("Always-increasing heartbeat ID"),
            )
            .add(
                self.pattern_pv(),
                DEFAULT_PATTERN.to_vec(),
                PvMetadata::new()
                    .max_length(MAX_PATTERN_LENGTH)
                    .doc("0 to skip beat, non-zero to beat"),
            );
        schema
    }
}

/// Value of the heartbeat bit for `beat_id`, or `None` to skip the beat.
pub fn beat(beat_id: i64, pattern: &[i64]) -> Option<i64> {
    if pattern.is_empty() {
        return None;
    }
    let len = pattern.len() as i64;
    let idx = usize::try_from(beat_id.rem_euclid(len)).ok()?;
    (pattern[idx] != 0).then_some(beat_id.rem_euclid(2))
}

impl SimTask for Heartbeat {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        let beat_id = store.read_i64(&self.beat_id_pv())?.wrapping_add(1);
        store.post(&self.beat_id_pv(), PvValue::Int(beat_id))?;

        let pattern = match store.value(&self.pattern_pv())? {
            PvValue::IntArray(pattern) => pattern,
            other => {
                return Err(SimError::Configuration(format!(
                    "{} must be an integer array, got {}",
                    self.pattern_pv(),
                    other.kind()
                )));
            }
        };

        if let Some(bit) = beat(beat_id, &pattern) {
            store.update_if_differs(&self.heartbeat_pv(), PvValue::Int(bit))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simioc_common::pv::MemoryStore;

    #[test]
    fn beat_follows_pattern() {
        assert_eq!(beat(0, &DEFAULT_PATTERN), None);
        assert_eq!(beat(1, &DEFAULT_PATTERN), Some(1));
        assert_eq!(beat(2, &DEFAULT_PATTERN), Some(0));
        assert_eq!(beat(6, &DEFAULT_PATTERN), None);
        assert_eq!(beat(7, &[]), None);
    }

    #[test]
    fn ticks_advance_beat_id_and_toggle() {
        let store = MemoryStore::new();
        let mut hb = Heartbeat::new("HB:");
        hb.schema().register_into(&store).unwrap();

        let mut bits = Vec::new();
        for _ in 0..7 {
            hb.tick(&store).unwrap();
            bits.push(store.read_i64("HB:heartbeat").unwrap());
        }
        assert_eq!(store.read_i64("HB:beat_id").unwrap(), 7);
        // Beat 6 is skipped, so the bit stays at beat 5's value.
        assert_eq!(bits, vec![1, 0, 1, 0, 1, 1, 1]);
    }

    #[test]
    fn pattern_is_writable() {
        let store = MemoryStore::new();
        let mut hb = Heartbeat::new("HB:");
        hb.schema().register_into(&store).unwrap();
        store.write("HB:beat_pattern", PvValue::from(vec![0i64])).unwrap();
        for _ in 0..3 {
            hb.tick(&store).unwrap();
        }
        assert_eq!(store.read_i64("HB:heartbeat").unwrap(), 0);
        assert!(store.write("HB:beat_pattern", PvValue::from(vec![1i64; 2000])).is_err());
    }
}
