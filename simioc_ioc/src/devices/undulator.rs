//! Undulator strength and photon energy.

use simioc_common::consts::POLL_PERIOD;
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::{SimError, SimTask};
use std::time::Duration;
use tracing::debug;

/// Electron rest energy, GeV.
const ELECTRON_MASS_GEV: f64 = 0.000_510_998_946_1;
/// Planck's constant, J s.
const PLANCK: f64 = 6.626_070_04e-34;
/// Elementary charge, C.
const ELEMENTARY_CHARGE: f64 = 1.602_176_620_8e-19;
/// Speed of light, m/s.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Undulator strength K for `gap` (mm) and `period` (mm).
pub fn calculate_k(k0: f64, a: f64, b: f64, period: f64, gap: f64) -> f64 {
    let ratio = gap / period;
    k0 * (a * ratio + b * ratio * ratio).exp()
}

/// Photon energy (eV) for electrons at `electron_energy` (GeV) through an
/// undulator of `period` (mm) and strength `k`.
pub fn photon_energy(electron_energy: f64, period: f64, k: f64) -> f64 {
    let gamma = electron_energy / ELECTRON_MASS_GEV;
    (2.0 * gamma * gamma * PLANCK * SPEED_OF_LIGHT)
        / (ELEMENTARY_CHARGE * period * 1e-3 * (1.0 + k * k / 2.0))
}

/// Tuning parameters and operating ranges of one undulator line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UndulatorParams {
    /// Strength scale.
    pub k0: f64,
    /// Linear tuning term.
    pub a: f64,
    /// Quadratic tuning term.
    pub b: f64,
    /// Period in mm.
    pub period: f64,
    /// Gap limits in mm.
    pub gap_range: (f64, f64),
    /// Electron energy limits in GeV.
    pub electron_energy_range: (f64, f64),
}

impl UndulatorParams {
    /// Hard X-ray undulator (copper line).
    pub const HXU: Self = Self {
        k0: 9.471,
        a: -5.131,
        b: 1.878,
        period: 26.0,
        gap_range: (7.2, 19.0),
        electron_energy_range: (2.5, 15.0),
    };

    /// Soft X-ray undulator.
    pub const SXU: Self = Self {
        k0: 13.997,
        a: -5.131,
        b: 1.878,
        period: 39.0,
        gap_range: (7.2, 20.0),
        electron_energy_range: (3.6, 4.0),
    };

    /// K at `gap`.
    pub fn k(&self, gap: f64) -> f64 {
        calculate_k(self.k0, self.a, self.b, self.period, gap)
    }
}

/// Beam parameter PVs of one undulator line. Recomputes `k` and
/// `photon_energy` whenever `gap` or `electron_energy` is written.
#[derive(Debug, Clone)]
pub struct BeamParameters {
    prefix: String,
    params: UndulatorParams,
    seen: (u64, u64),
}

impl BeamParameters {
    /// Beam parameters under `prefix`.
    pub fn new(prefix: impl Into<String>, params: UndulatorParams) -> Self {
        Self {
            prefix: prefix.into(),
            params,
            seen: (0, 0),
        }
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `gap`.
    pub fn gap_pv(&self) -> String {
        self.pv("gap")
    }

    /// `electron_energy`.
    pub fn electron_energy_pv(&self) -> String {
        self.pv("electron_energy")
    }

    /// `k`.
    pub fn k_pv(&self) -> String {
        self.pv("k")
    }

    /// `photon_energy`.
    pub fn photon_energy_pv(&self) -> String {
        self.pv("photon_energy")
    }

    /// PV schema. Gap and electron energy start at their lower limits.
    pub fn schema(&self) -> PvSchema {
        let p = &self.params;
        let info = || PvMetadata::new().read_only();
        let mut schema = PvSchema::new();
        schema
            .add(self.pv("k0"), p.k0, info())
            .add(self.pv("a"), p.a, info())
            .add(self.pv("b"), p.b, info())
            .add(self.pv("period"), p.period, info().units("mm"))
            .add(
                self.pv("rate"),
                10,
                PvMetadata::new().units("Hz").doc("Repetition rate"),
            )
            .add(
                self.pv("charge"),
                10,
                PvMetadata::new().units("pC").doc("Bunch charge"),
            )
            .add(
                self.gap_pv(),
                p.gap_range.0,
                PvMetadata::new()
                    .limits(p.gap_range.0, p.gap_range.1)
                    .units("mm")
                    .doc("Undulator gap"),
            )
            .add(
                self.k_pv(),
                0.0,
                PvMetadata::new().units("n/a").doc("Undulator strength (K)"),
            )
            .add(
                self.electron_energy_pv(),
                p.electron_energy_range.0,
                PvMetadata::new()
                    .limits(p.electron_energy_range.0, p.electron_energy_range.1)
                    .precision(4)
                    .units("GeV")
                    .doc("Electron energy"),
            )
            .add(
                self.photon_energy_pv(),
                0.0,
                PvMetadata::new()
                    .read_only()
                    .precision(4)
                    .doc("Photon energy"),
            );
        schema
    }

    fn recalculate(&self, store: &dyn ValueStore) -> Result<(), SimError> {
        let k = self.params.k(store.read_f64(&self.gap_pv())?);
        let energy = photon_energy(
            store.read_f64(&self.electron_energy_pv())?,
            self.params.period,
            k,
        );
        store.post(&self.k_pv(), PvValue::Double(k))?;
        store.post(&self.photon_energy_pv(), PvValue::Double(energy))?;
        debug!("{}: K = {:.4}, photon energy = {:.1} eV", self.prefix, k, energy);
        Ok(())
    }

    fn generations(&self, store: &dyn ValueStore) -> Result<(u64, u64), SimError> {
        Ok((
            store.generation(&self.gap_pv())?,
            store.generation(&self.electron_energy_pv())?,
        ))
    }
}

impl SimTask for BeamParameters {
    fn name(&self) -> &str {
        &self.prefix
    }

    fn period(&self) -> Duration {
        POLL_PERIOD
    }

    fn startup(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        self.seen = self.generations(store)?;
        self.recalculate(store)
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        let current = self.generations(store)?;
        if current != self.seen {
            self.seen = current;
            self.recalculate(store)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simioc_common::pv::MemoryStore;

    #[test]
    fn k_falls_with_gap() {
        let p = UndulatorParams::HXU;
        assert!((p.k(7.2) - 2.6414).abs() < 1e-3);
        assert!(p.k(10.0) < p.k(7.2));
        assert_eq!(calculate_k(2.0, 0.0, 0.0, 26.0, 7.2), 2.0);
    }

    #[test]
    fn startup_computes_photon_energy() {
        let store = MemoryStore::new();
        let mut hxu = BeamParameters::new("PREFIX:hxu:", UndulatorParams::HXU);
        hxu.schema().register_into(&store).unwrap();
        hxu.startup(&store).unwrap();

        let energy = store.read_f64("PREFIX:hxu:photon_energy").unwrap();
        assert!((500.0..520.0).contains(&energy), "got {energy}");
    }

    #[test]
    fn writes_trigger_recalculation() {
        let store = MemoryStore::new();
        let mut sxu = BeamParameters::new("sxu:", UndulatorParams::SXU);
        sxu.schema().register_into(&store).unwrap();
        sxu.startup(&store).unwrap();
        let before = store.read_f64("sxu:photon_energy").unwrap();

        store.write("sxu:gap", PvValue::Double(15.0)).unwrap();
        sxu.tick(&store).unwrap();
        let k = store.read_f64("sxu:k").unwrap();
        assert!((k - UndulatorParams::SXU.k(15.0)).abs() < 1e-12);
        assert!(store.read_f64("sxu:photon_energy").unwrap() > before);

        assert!(store.write("sxu:gap", PvValue::Double(25.0)).is_err());
        assert!(store.write("sxu:photon_energy", PvValue::Double(1.0)).is_err());
    }
}
