//! Stellar-activity proxies for the activity-correlation check.
//!
//! A proxy is any time series that tracks the star rather than a planet:
//! an externally supplied index, the slow trend the detrender divided out,
//! or a seeded synthetic rotational signal when nothing better exists.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::lightcurve::LightCurve;
use crate::stats;

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("activity proxy has no samples")]
    Empty,

    #[error("activity proxy time and value lengths differ ({0} vs {1})")]
    LengthMismatch(usize, usize),

    #[error("activity proxy time is not increasing at sample {0}")]
    NotIncreasing(usize),

    #[error("failed to read activity proxy: {0}")]
    Csv(#[from] csv::Error),
}

/// Where a proxy came from; recorded in reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxySource {
    Supplied,
    DetrendTrend,
    Synthetic,
}

#[derive(Debug, Deserialize)]
struct ProxyRow {
    time: f64,
    value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivityProxy {
    pub source: ProxySource,
    time: Vec<f64>,
    value: Vec<f64>,
}

impl ActivityProxy {
    /// A supplied series with ascending timestamps.
    pub fn from_series(time: Vec<f64>, value: Vec<f64>) -> Result<Self, ActivityError> {
        Self::checked(ProxySource::Supplied, time, value)
    }

    /// The trend removed by the detrender, on the light curve's own times.
    pub fn from_trend(lc: &LightCurve, trend: &[f64]) -> Result<Self, ActivityError> {
        Self::checked(ProxySource::DetrendTrend, lc.time().to_vec(), trend.to_vec())
    }

    /// A sinusoid at `rotation_period` with a random phase and 10 % jitter,
    /// sampled on `times`.
    pub fn synthetic(times: &[f64], rotation_period: f64, seed: u64) -> Result<Self, ActivityError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let phase = rng.gen_range(0.0..std::f64::consts::TAU);
        let period = if rotation_period > 0.0 { rotation_period } else { 10.0 };
        let value = times
            .iter()
            .map(|&t| (std::f64::consts::TAU * t / period + phase).sin() + rng.gen_range(-0.1..0.1))
            .collect();
        Self::checked(ProxySource::Synthetic, times.to_vec(), value)
    }

    /// Read a `time,value` CSV file (header required, `#` comments allowed).
    pub fn from_csv(path: &Path) -> Result<Self, ActivityError> {
        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut time = Vec::new();
        let mut value = Vec::new();
        for row in reader.deserialize() {
            let row: ProxyRow = row?;
            time.push(row.time);
            value.push(row.value);
        }
        Self::from_series(time, value)
    }

    fn checked(source: ProxySource, time: Vec<f64>, value: Vec<f64>) -> Result<Self, ActivityError> {
        if time.is_empty() {
            return Err(ActivityError::Empty);
        }
        if time.len() != value.len() {
            return Err(ActivityError::LengthMismatch(time.len(), value.len()));
        }
        if let Some(i) = (1..time.len()).find(|&i| time[i] < time[i - 1]) {
            return Err(ActivityError::NotIncreasing(i));
        }
        Ok(Self { source, time, value })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Linearly interpolated proxy values at `times`.
    pub fn sample_at(&self, times: &[f64]) -> Vec<f64> {
        times
            .iter()
            .map(|&t| stats::interpolate(&self.time, &self.value, t).unwrap_or(f64::NAN))
            .collect()
    }
}

/// Pearson correlation between the flux residual (`flux − 1`) and the proxy
/// sampled at the light-curve timestamps.
pub fn activity_correlation(lc: &LightCurve, proxy: &ActivityProxy) -> Option<f64> {
    let residual: Vec<f64> = lc.flux().iter().map(|f| f - 1.0).collect();
    let sampled = proxy.sample_at(&lc.time().to_vec());
    stats::pearson_correlation(&residual, &sampled)
}
