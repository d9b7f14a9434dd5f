//! Dispersion-scan spectrum playback.
//!
//! Every 0.2 s, while `DScan:SimEnable` is set, the task looks up the
//! spectrum recorded closest to the scan motor's readback, adds uniform
//! noise scaled by `DScan:NoiseLevel` and publishes it to the spectrometer.

use ndarray::{Ix1, Ix2, OwnedRepr};
use ndarray_npy::NpzReader;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use simioc_common::consts::{DEFAULT_SPECTRUM_NOISE, DSCAN_PERIOD};
use simioc_common::pv::{PvMetadata, PvSchema, PvValue, ValueStore};
use simioc_common::sim::{SimError, SimTask};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::spectrometer::SPECTRUM_LENGTH;

/// Spectra recorded at a series of motor positions.
///
/// Positions are in mm, wavelengths in nm.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumDataset {
    positions: Vec<f64>,
    wavelengths: Vec<f64>,
    intensities: Vec<Vec<f64>>,
}

impl SpectrumDataset {
    /// Dataset from one intensity row per position.
    pub fn new(
        positions: Vec<f64>,
        wavelengths: Vec<f64>,
        intensities: Vec<Vec<f64>>,
    ) -> Result<Self, SimError> {
        let invalid = |reason: String| SimError::Configuration(format!("Spectrum dataset: {reason}"));

        if positions.is_empty() {
            return Err(invalid("no positions".to_string()));
        }
        if positions.iter().any(|p| !p.is_finite()) {
            return Err(invalid("non-finite position".to_string()));
        }
        if wavelengths.is_empty() || wavelengths.len() > SPECTRUM_LENGTH {
            return Err(invalid(format!(
                "{} wavelengths, expected 1..={SPECTRUM_LENGTH}",
                wavelengths.len()
            )));
        }
        if intensities.len() != positions.len() {
            return Err(invalid(format!(
                "{} spectra for {} positions",
                intensities.len(),
                positions.len()
            )));
        }
        if let Some(row) = intensities.iter().find(|r| r.len() != wavelengths.len()) {
            return Err(invalid(format!(
                "spectrum of {} points for {} wavelengths",
                row.len(),
                wavelengths.len()
            )));
        }

        Ok(Self {
            positions,
            wavelengths,
            intensities,
        })
    }

    /// Load a `.npz` archive holding `positions` (m), `wavelengths` (m) and
    /// `intensities` (positions x wavelengths).
    pub fn from_npz(path: &Path) -> Result<Self, SimError> {
        let failed = |what: &str, e: &dyn std::fmt::Display| {
            SimError::Configuration(format!("Failed to {what} '{}': {e}", path.display()))
        };

        let file = File::open(path).map_err(|e| failed("open dataset", &e))?;
        let mut npz = NpzReader::new(file).map_err(|e| failed("read npz", &e))?;

        let positions = read_array1(&mut npz, "positions").map_err(|e| failed("read positions from", &e))?;
        let wavelengths =
            read_array1(&mut npz, "wavelengths").map_err(|e| failed("read wavelengths from", &e))?;
        let intensities = npz
            .by_name::<OwnedRepr<f64>, Ix2>("intensities.npy")
            .or_else(|_| npz.by_name::<OwnedRepr<f64>, Ix2>("intensities"))
            .map_err(|e| failed("read intensities from", &e))?;

        let dataset = Self::new(
            positions.iter().map(|p| p * 1e3).collect(),
            wavelengths.iter().map(|w| w * 1e9).collect(),
            intensities.outer_iter().map(|row| row.to_vec()).collect(),
        )?;

        let (low, high) = dataset.position_range();
        info!(
            "Loaded {} spectra from {:?}, positions {} to {} mm",
            dataset.positions.len(),
            path,
            low,
            high
        );
        Ok(dataset)
    }

    /// Gaussian pulse spectra over 700..900 nm for positions -25..=25 mm.
    /// The centre shifts and the pulse broadens away from zero.
    pub fn synthetic() -> Self {
        const POINTS: usize = 1024;
        const STEPS: usize = 100;

        let wavelengths: Vec<f64> = (0..POINTS)
            .map(|i| 700.0 + 200.0 * i as f64 / (POINTS - 1) as f64)
            .collect();
        let positions: Vec<f64> = (0..=STEPS).map(|i| -25.0 + 0.5 * i as f64).collect();
        let intensities = positions
            .iter()
            .map(|pos| {
                let centre = 800.0 + 2.0 * pos;
                let width = 10.0 + pos.abs();
                wavelengths
                    .iter()
                    .map(|w| (-0.5 * ((w - centre) / width).powi(2)).exp())
                    .collect()
            })
            .collect();

        Self {
            positions,
            wavelengths,
            intensities,
        }
    }

    /// Wavelength axis in nm.
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Lowest and highest recorded position.
    pub fn position_range(&self) -> (f64, f64) {
        self.positions
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(*p), hi.max(*p)))
    }

    /// The spectrum recorded nearest to `position`. Zeros when `position`
    /// lies more than one step outside the recorded range.
    pub fn closest_spectrum(&self, position: f64) -> Vec<f64> {
        let zeros = || vec![0.0; self.wavelengths.len()];
        let (low, high) = self.position_range();
        let step = match self.positions.as_slice() {
            [first, second, ..] => (second - first).abs(),
            _ => 0.0,
        };
        if !position.is_finite() || position < low - step || position > high + step {
            return zeros();
        }

        self.positions
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - position).abs().total_cmp(&(*b - position).abs()))
            .and_then(|(idx, _)| self.intensities.get(idx).cloned())
            .unwrap_or_else(zeros)
    }
}

fn read_array1(
    npz: &mut NpzReader<File>,
    key: &str,
) -> Result<ndarray::Array1<f64>, ndarray_npy::ReadNpzError> {
    npz.by_name::<OwnedRepr<f64>, Ix1>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<OwnedRepr<f64>, Ix1>(key))
}

/// Spectrum playback task under `{prefix}DScan:`.
pub struct DscanTask {
    name: String,
    spectrometer: String,
    motor_readback: String,
    dataset: SpectrumDataset,
    noise_level: f64,
    last_position: Option<f64>,
    rng: StdRng,
    period: Duration,
}

impl DscanTask {
    /// Play `dataset` into the spectrometer at `spectrometer`, following
    /// the motor readback PV `motor_readback`.
    pub fn new(
        prefix: &str,
        spectrometer: impl Into<String>,
        motor_readback: impl Into<String>,
        dataset: SpectrumDataset,
    ) -> Self {
        Self {
            name: format!("{prefix}DScan:"),
            spectrometer: spectrometer.into(),
            motor_readback: motor_readback.into(),
            dataset,
            noise_level: DEFAULT_SPECTRUM_NOISE,
            last_position: None,
            rng: StdRng::from_entropy(),
            period: DSCAN_PERIOD,
        }
    }

    /// Initial `NoiseLevel`.
    pub fn with_noise_level(mut self, noise_level: f64) -> Self {
        self.noise_level = noise_level;
        self
    }

    /// Fixed noise seed, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// `SimEnable`.
    pub fn enable(&self) -> String {
        format!("{}SimEnable", self.name)
    }

    /// `NoiseLevel`.
    pub fn noise(&self) -> String {
        format!("{}NoiseLevel", self.name)
    }

    fn spectrum(&self) -> String {
        format!("{}:SPECTRUM", self.spectrometer)
    }

    fn wavelengths(&self) -> String {
        format!("{}:WAVELENGTHS", self.spectrometer)
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .add(
                self.enable(),
                PvValue::from(true),
                PvMetadata::new().doc("Enable simulation mode"),
            )
            .add(
                self.noise(),
                self.noise_level,
                PvMetadata::new().doc("Simulation mode noise level for spectra"),
            );
        schema
    }
}

impl SimTask for DscanTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        if !store.read_bool(&self.enable())? {
            return Ok(());
        }

        let position = store.read_f64(&self.motor_readback)?;
        if self.last_position != Some(position) {
            debug!("Spectrum from dataset at {:.4} mm", position);
            self.last_position = Some(position);
        }

        let noise = store.read_f64(&self.noise())?;
        let mut spectrum = self.dataset.closest_spectrum(position);
        for point in &mut spectrum {
            *point += self.rng.r#gen::<f64>() * noise;
        }

        store.update_if_differs(
            &self.wavelengths(),
            PvValue::DoubleArray(self.dataset.wavelengths().to_vec()),
        )?;
        store.update_if_differs(&self.spectrum(), PvValue::DoubleArray(spectrum))?;
        Ok(())
    }
}
