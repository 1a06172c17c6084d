//! Seeded synthetic light curves.
//!
//! Used by the test suites and the demo binaries to exercise the pipeline on
//! data with known answers: box-shaped transits (optionally with unequal
//! odd/even depths, as an eclipsing binary would show), sinusoidal stellar
//! variability and white noise.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::archive::{MemoryArchive, Sector};
use crate::config::TargetConfig;
use crate::lightcurve::{LightCurve, LightCurveError};

/// A periodic box-shaped dip.
#[derive(Clone, Debug, PartialEq)]
pub struct InjectedTransit {
    pub period: f64,
    /// Mid-transit time of transit 0, BTJD.
    pub epoch: f64,
    /// Fractional depth of even-numbered transits.
    pub depth: f64,
    pub duration: f64,
    /// Odd-numbered transits are `odd_depth_ratio × depth` deep.
    pub odd_depth_ratio: f64,
}

impl InjectedTransit {
    pub fn new(period: f64, epoch: f64, depth: f64, duration: f64) -> Self {
        Self {
            period,
            epoch,
            depth,
            duration,
            odd_depth_ratio: 1.0,
        }
    }

    /// Fractional flux deficit at time `t`.
    pub fn deficit(&self, t: f64) -> f64 {
        let cycles = (t - self.epoch) / self.period;
        let n = (cycles + 0.5).floor();
        let dt = (cycles - n) * self.period;
        if dt.abs() >= self.duration / 2.0 {
            return 0.0;
        }
        if (n as i64).rem_euclid(2) == 1 {
            self.depth * self.odd_depth_ratio
        } else {
            self.depth
        }
    }
}

/// Sinusoidal stellar variability.
#[derive(Clone, Debug, PartialEq)]
pub struct Variability {
    /// Fractional semi-amplitude.
    pub amplitude: f64,
    pub period: f64,
    pub phase: f64,
}

impl Variability {
    pub fn at(&self, t: f64) -> f64 {
        self.amplitude * (std::f64::consts::TAU * t / self.period + self.phase).sin()
    }
}

/// Recipe for a synthetic light curve.
#[derive(Clone, Debug)]
pub struct SyntheticLightCurve {
    pub target: String,
    /// First timestamp, BTJD.
    pub start: f64,
    pub baseline_days: f64,
    pub cadence_minutes: f64,
    /// White noise standard deviation in ppm.
    pub noise_ppm: f64,
    pub transits: Vec<InjectedTransit>,
    pub variability: Option<Variability>,
    /// Median flux level before normalisation.
    pub flux_level: f64,
    /// Length of one sector when splitting into [`Sector`]s.
    pub sector_days: f64,
    pub first_sector: u32,
    pub seed: u64,
}

impl Default for SyntheticLightCurve {
    fn default() -> Self {
        Self {
            target: "TIC 0".to_string(),
            start: 1325.0,
            baseline_days: 27.0,
            cadence_minutes: 2.0,
            noise_ppm: 500.0,
            transits: Vec::new(),
            variability: None,
            flux_level: 1.0,
            sector_days: 27.4,
            first_sector: 1,
            seed: 0,
        }
    }
}

impl SyntheticLightCurve {
    /// Sample timestamps.
    pub fn times(&self) -> Vec<f64> {
        let dt = self.cadence_minutes / 1440.0;
        let n = (self.baseline_days / dt).floor() as usize + 1;
        (0..n).map(|i| self.start + i as f64 * dt).collect()
    }

    /// Noise-free model flux relative to `flux_level`.
    pub fn model(&self, t: f64) -> f64 {
        let dip: f64 = self.transits.iter().map(|tr| tr.deficit(t)).sum();
        let var = self.variability.as_ref().map_or(0.0, |v| v.at(t));
        (1.0 - dip) * (1.0 + var)
    }

    fn columns(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let sigma = self.noise_ppm * 1e-6;
        let time = self.times();
        let flux: Vec<f64> = match Normal::new(0.0, sigma) {
            Ok(noise) if sigma > 0.0 => time
                .iter()
                .map(|&t| self.flux_level * (self.model(t) + noise.sample(&mut rng)))
                .collect(),
            _ => time.iter().map(|&t| self.flux_level * self.model(t)).collect(),
        };
        let err_value = if sigma > 0.0 { sigma * self.flux_level } else { 1e-6 * self.flux_level };
        let flux_err = vec![err_value; time.len()];
        (time, flux, flux_err)
    }

    /// Generate the light curve.
    pub fn build(&self) -> Result<LightCurve, LightCurveError> {
        let (time, flux, flux_err) = self.columns();
        LightCurve::from_vecs(self.target.clone(), time, flux, flux_err)
    }

    /// Generate the same samples split into consecutive sectors.
    pub fn sectors(&self) -> Vec<Sector> {
        let (time, flux, flux_err) = self.columns();
        let mut sectors: Vec<Sector> = Vec::new();
        for i in 0..time.len() {
            let idx = ((time[i] - self.start) / self.sector_days).floor() as u32;
            let number = self.first_sector + idx;
            if sectors.last().map(|s| s.sector) != Some(number) {
                sectors.push(Sector {
                    sector: number,
                    ..Sector::default()
                });
            }
            if let Some(s) = sectors.last_mut() {
                s.time.push(time[i]);
                s.flux.push(flux[i]);
                s.flux_err.push(flux_err[i]);
                s.quality.push(0);
            }
        }
        sectors
    }
}

/// Depth injected for known planets whose preset carries no literature
/// depth.
const DEMO_DEFAULT_DEPTH_PPM: f64 = 1000.0;

/// An in-memory archive holding two synthetic sectors for `cfg.target`,
/// with every known planet of the preset injected.
pub fn demo_archive(cfg: &TargetConfig, seed: u64) -> MemoryArchive {
    let transits = cfg
        .known_planets
        .iter()
        .map(|p| {
            let depth_ppm = if p.depth_ppm > 0.0 { p.depth_ppm } else { DEMO_DEFAULT_DEPTH_PPM };
            InjectedTransit::new(
                p.period,
                p.epoch_btjd(),
                depth_ppm * 1e-6,
                (0.05 * p.period).clamp(0.04, 0.15),
            )
        })
        .collect();
    let recipe = SyntheticLightCurve {
        target: cfg.target.clone(),
        baseline_days: 54.0,
        cadence_minutes: 10.0,
        noise_ppm: 300.0,
        transits,
        variability: Some(Variability {
            amplitude: 0.002,
            period: 9.3,
            phase: 0.0,
        }),
        flux_level: 5000.0,
        first_sector: 12,
        seed,
        ..SyntheticLightCurve::default()
    };
    let mut archive = MemoryArchive::new();
    archive.insert(&cfg.target, recipe.sectors());
    archive
}
