//! Generalised (floating-mean) Lomb–Scargle periodogram.
//!
//! Used to find the dominant stellar variability period, which the report
//! quotes alongside the transit candidates and which seeds the synthetic
//! activity proxy.  Power is normalised to `[0, 1]` as in Zechmeister &
//! Kürster (2009).

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::lightcurve::LightCurve;

#[derive(Debug, thiserror::Error)]
pub enum LombScargleError {
    #[error("need at least 3 samples, got {0}")]
    TooFewSamples(usize),

    #[error("invalid period range {min}..{max}")]
    InvalidPeriodRange { min: f64, max: f64 },
}

/// Grid settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LombScargleParams {
    pub minimum_period: f64,
    pub maximum_period: f64,
    /// Grid points per expected peak width (1 / baseline).
    pub samples_per_peak: usize,
}

impl Default for LombScargleParams {
    fn default() -> Self {
        Self {
            minimum_period: 0.1,
            maximum_period: 30.0,
            samples_per_peak: 5,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LombScarglePeriodogram {
    pub frequency: Vec<f64>,
    pub power: Vec<f64>,
}

impl LombScarglePeriodogram {
    /// Period of maximum power.
    pub fn best_period(&self) -> Option<f64> {
        self.power
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| 1.0 / self.frequency[i])
    }

    pub fn max_power(&self) -> Option<f64> {
        self.power.iter().copied().filter(|p| p.is_finite()).reduce(f64::max)
    }
}

/// Compute the periodogram of `lc` over the configured period range.
pub fn lomb_scargle(
    lc: &LightCurve,
    params: &LombScargleParams,
) -> Result<LombScarglePeriodogram, LombScargleError> {
    let n = lc.len();
    if n < 3 {
        return Err(LombScargleError::TooFewSamples(n));
    }
    let (p_min, p_max) = (params.minimum_period, params.maximum_period);
    if !(p_min > 0.0 && p_max > p_min) {
        return Err(LombScargleError::InvalidPeriodRange { min: p_min, max: p_max });
    }

    let t = lc.time().to_vec();
    let y = lc.flux().to_vec();
    let w = normalised_weights(&lc.flux_err().to_vec());

    let baseline = lc.baseline().max(p_min);
    let df = 1.0 / (baseline * params.samples_per_peak.max(1) as f64);
    let (f_min, f_max) = (1.0 / p_max, 1.0 / p_min);
    let nf = (((f_max - f_min) / df).ceil() as usize).max(2);
    let step = (f_max - f_min) / (nf - 1) as f64;
    let frequency: Vec<f64> = (0..nf).map(|i| f_min + i as f64 * step).collect();

    let y_mean: f64 = w.iter().zip(&y).map(|(wi, yi)| wi * yi).sum();
    let mut yy: f64 = w.iter().zip(&y).map(|(wi, yi)| wi * (yi - y_mean).powi(2)).sum();
    // Rounding residue of a constant series.
    if yy < 1e-24 {
        yy = 0.0;
    }

    let power: Vec<f64> = frequency
        .par_iter()
        .map(|&f| power_at(&t, &y, &w, f, y_mean, yy))
        .collect();

    let pg = LombScarglePeriodogram { frequency, power };
    if let Some(p) = pg.best_period() {
        info!("Lomb-Scargle: {} frequencies, dominant period {:.3} d", pg.frequency.len(), p);
    }
    Ok(pg)
}

/// Inverse-variance weights summing to one; uniform when no uncertainty is
/// usable.
fn normalised_weights(err: &[f64]) -> Vec<f64> {
    let raw: Vec<f64> = err
        .iter()
        .map(|&e| if e.is_finite() && e > 0.0 { 1.0 / (e * e) } else { 0.0 })
        .collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 && raw.iter().all(|&w| w > 0.0) {
        raw.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / err.len() as f64; err.len()]
    }
}

fn power_at(t: &[f64], y: &[f64], w: &[f64], f: f64, y_mean: f64, yy: f64) -> f64 {
    let omega = std::f64::consts::TAU * f;
    let (mut s, mut c, mut ss, mut cc, mut cs, mut ys, mut yc) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for ((&ti, &yi), &wi) in t.iter().zip(y).zip(w) {
        let (sin, cos) = (omega * ti).sin_cos();
        s += wi * sin;
        c += wi * cos;
        ss += wi * sin * sin;
        cc += wi * cos * cos;
        cs += wi * sin * cos;
        ys += wi * (yi - y_mean) * sin;
        yc += wi * (yi - y_mean) * cos;
    }
    let cc_hat = cc - c * c;
    let ss_hat = ss - s * s;
    let cs_hat = cs - c * s;
    let d = cc_hat * ss_hat - cs_hat * cs_hat;
    if yy <= 0.0 || d <= 0.0 {
        return 0.0;
    }
    (ss_hat * yc * yc + cc_hat * ys * ys - 2.0 * cs_hat * yc * ys) / (yy * d)
}
