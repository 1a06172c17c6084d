//! Box-Least-Squares period search for transit detection.
//!
//! # Background
//!
//! A planet crossing the disc of its star blocks a small, constant fraction
//! of the light for a few hours once per orbit.  Folded at the right period
//! the dips line up into a box-shaped depression; at any other period they
//! smear out.  BLS tries every plausible period and, for each one, finds the
//! box (duration, phase) that best explains the folded data.
//!
//! # Algorithm overview
//!
//! 1. **Weights**: inverse-variance weights from the flux uncertainties
//!    (invalid uncertainties take the median valid one).
//! 2. **Period grid**: evenly spaced in frequency with step
//!    `frequency_factor · min(duration) / baseline²`, which keeps the phase
//!    drift across the baseline below one shortest duration.
//! 3. **Binned fold**: for each period, fold into phase bins of width
//!    `min(duration) / oversample` holding Σw and Σw·y.
//! 4. **Box scan**: slide every trial duration across the bins (wrapping
//!    around phase 1 → 0) and score each box by the log-likelihood gain of a
//!    two-level model, `½ · depth² · W_in · W_out / W_total`.  Only dips
//!    (positive depth) are scored.  This step is embarrassingly parallel
//!    across periods and executed with **rayon**.
//! 5. **Result**: a [`Periodogram`] with the best box at every period.

use std::time::Instant;

use log::{debug, info};
use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::lightcurve::LightCurve;
use crate::stats;
use crate::types::{BlsParams, TransitCandidate};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during a BLS search.
#[derive(Debug, thiserror::Error)]
pub enum BlsError {
    #[error("input has no samples")]
    EmptyData,

    #[error("time, flux and flux_err have different lengths ({0}, {1}, {2})")]
    LengthMismatch(usize, usize, usize),

    #[error("invalid period range {min}..{max}")]
    InvalidPeriodRange { min: f64, max: f64 },

    #[error("no trial duration is shorter than the minimum period {0}")]
    NoUsableDurations(f64),

    #[error("time baseline is zero")]
    ZeroBaseline,
}

// ---------------------------------------------------------------------------
// Periodogram
// ---------------------------------------------------------------------------

/// Best-fit box at a single trial period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxFit {
    pub period: f64,
    pub power: f64,
    pub depth: f64,
    pub depth_err: f64,
    pub duration: f64,
    pub transit_time: f64,
}

/// Power and best-fit box parameters on a grid of trial periods, in
/// ascending period order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Periodogram {
    pub periods: Vec<f64>,
    pub power: Vec<f64>,
    pub depth: Vec<f64>,
    pub depth_err: Vec<f64>,
    pub duration: Vec<f64>,
    pub transit_time: Vec<f64>,
}

impl Periodogram {
    pub fn from_fits(fits: Vec<BoxFit>) -> Self {
        let mut pg = Self::default();
        for f in fits {
            pg.periods.push(f.period);
            pg.power.push(f.power);
            pg.depth.push(f.depth);
            pg.depth_err.push(f.depth_err);
            pg.duration.push(f.duration);
            pg.transit_time.push(f.transit_time);
        }
        pg
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn fit(&self, i: usize) -> BoxFit {
        BoxFit {
            period: self.periods[i],
            power: self.power[i],
            depth: self.depth[i],
            depth_err: self.depth_err[i],
            duration: self.duration[i],
            transit_time: self.transit_time[i],
        }
    }

    /// Index of the maximum power, if any entry has finite power.
    pub fn argmax(&self) -> Option<usize> {
        self.power
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Box fit at the maximum power.
    pub fn best(&self) -> Option<BoxFit> {
        self.argmax().map(|i| self.fit(i))
    }

    pub fn max_power(&self) -> Option<f64> {
        self.best().map(|b| b.power)
    }

    /// A copy without the periods within ±`half_width` days of `period`.
    pub fn without_window(&self, period: f64, half_width: f64) -> Self {
        let fits = (0..self.len())
            .filter(|&i| (self.periods[i] - period).abs() > half_width)
            .map(|i| self.fit(i))
            .collect();
        Self::from_fits(fits)
    }

    /// Box fit at the maximum power expressed as a candidate record.
    pub fn candidate_at(&self, i: usize, rank: usize) -> TransitCandidate {
        let f = self.fit(i);
        TransitCandidate {
            rank,
            period: f.period,
            power: f.power,
            depth: f.depth,
            depth_err: f.depth_err,
            duration: f.duration,
            transit_time: f.transit_time,
        }
    }
}

// ---------------------------------------------------------------------------
// BlsEngine
// ---------------------------------------------------------------------------

/// Flux prepared for repeated folding: times relative to the first sample,
/// mean-subtracted flux, and inverse-variance weights.
struct Prepared {
    t_ref: f64,
    t: Vec<f64>,
    y: Vec<f64>,
    w: Vec<f64>,
    w_total: f64,
    wy_total: f64,
    baseline: f64,
}

impl Prepared {
    fn new(
        time: ArrayView1<'_, f64>,
        flux: ArrayView1<'_, f64>,
        flux_err: ArrayView1<'_, f64>,
    ) -> Result<Self, BlsError> {
        if time.len() != flux.len() || time.len() != flux_err.len() {
            return Err(BlsError::LengthMismatch(time.len(), flux.len(), flux_err.len()));
        }

        let valid_err: Vec<f64> = flux_err
            .iter()
            .copied()
            .filter(|e| e.is_finite() && *e > 0.0)
            .collect();
        let fallback_err = stats::median(&valid_err).unwrap_or(1.0);

        let mut t = Vec::with_capacity(time.len());
        let mut y = Vec::with_capacity(time.len());
        let mut w = Vec::with_capacity(time.len());
        for ((&ti, &fi), &ei) in time.iter().zip(flux.iter()).zip(flux_err.iter()) {
            if !(ti.is_finite() && fi.is_finite()) {
                continue;
            }
            let e = if ei.is_finite() && ei > 0.0 { ei } else { fallback_err };
            t.push(ti);
            y.push(fi);
            w.push(1.0 / (e * e));
        }
        if t.is_empty() {
            return Err(BlsError::EmptyData);
        }

        let t_min = t.iter().copied().fold(f64::INFINITY, f64::min);
        let t_max = t.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let w_total: f64 = w.iter().sum();
        let mean = w.iter().zip(&y).map(|(wi, yi)| wi * yi).sum::<f64>() / w_total;

        t.iter_mut().for_each(|ti| *ti -= t_min);
        y.iter_mut().for_each(|yi| *yi -= mean);
        let wy_total = w.iter().zip(&y).map(|(wi, yi)| wi * yi).sum();

        Ok(Self {
            t_ref: t_min,
            t,
            y,
            w,
            w_total,
            wy_total,
            baseline: t_max - t_min,
        })
    }
}

/// The Box-Least-Squares search engine.
///
/// Construct with [`BlsParams`] and call [`BlsEngine::search`] on a light
/// curve to obtain a [`Periodogram`].
#[derive(Clone, Debug)]
pub struct BlsEngine {
    params: BlsParams,
}

impl BlsEngine {
    pub fn new(params: BlsParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BlsParams {
        &self.params
    }

    /// Run the period search on a light curve.
    pub fn search(&self, lc: &LightCurve) -> Result<Periodogram, BlsError> {
        let start = Instant::now();
        info!(
            "Starting BLS search on {} samples: period {:.3}-{:.3} d, frequency_factor={:.1}",
            lc.len(),
            self.params.minimum_period,
            self.params.maximum_period,
            self.params.frequency_factor,
        );

        // -- configure rayon thread pool -----------------------------------
        if self.params.n_workers > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.n_workers)
                .build_global()
                .ok(); // ignore if already initialised
        }

        let pg = self.search_arrays(lc.time(), lc.flux(), lc.flux_err())?;

        let elapsed = start.elapsed().as_millis() as u64;
        match pg.best() {
            Some(best) => info!(
                "BLS complete in {} ms over {} periods; best P={:.4} d, power={:.1}",
                elapsed,
                pg.len(),
                best.period,
                best.power
            ),
            None => info!("BLS complete in {} ms; no dip found", elapsed),
        }
        Ok(pg)
    }

    /// Run the period search on raw columns.  Unlike [`LightCurve`], the
    /// samples need not be ordered or unique (bootstrap resamples and
    /// timestamp permutations are passed through here).
    pub fn search_arrays(
        &self,
        time: ArrayView1<'_, f64>,
        flux: ArrayView1<'_, f64>,
        flux_err: ArrayView1<'_, f64>,
    ) -> Result<Periodogram, BlsError> {
        let prepared = Prepared::new(time, flux, flux_err)?;
        let durations = self.usable_durations()?;
        let periods = self.period_grid(prepared.baseline)?;
        debug!("Searching {} trial periods, {} durations", periods.len(), durations.len());

        let fits: Vec<BoxFit> = periods
            .par_iter()
            .map(|&period| self.evaluate_period(&prepared, period, &durations))
            .collect();

        Ok(Periodogram::from_fits(fits))
    }

    /// Trial durations shorter than the minimum period, ascending.
    pub fn usable_durations(&self) -> Result<Vec<f64>, BlsError> {
        let mut d: Vec<f64> = self
            .params
            .durations
            .iter()
            .copied()
            .filter(|&d| d > 0.0 && d < self.params.minimum_period)
            .collect();
        if d.is_empty() {
            return Err(BlsError::NoUsableDurations(self.params.minimum_period));
        }
        d.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(d)
    }

    /// Trial periods for a data set spanning `baseline` days, ascending.
    pub fn period_grid(&self, baseline: f64) -> Result<Vec<f64>, BlsError> {
        let (p_min, p_max) = (self.params.minimum_period, self.params.maximum_period);
        if !(p_min > 0.0 && p_max > p_min && p_max.is_finite()) {
            return Err(BlsError::InvalidPeriodRange { min: p_min, max: p_max });
        }
        if baseline <= 0.0 {
            return Err(BlsError::ZeroBaseline);
        }

        let min_duration = self.usable_durations()?[0];
        let df = self.params.frequency_factor * min_duration / (baseline * baseline);
        let (f_min, f_max) = (1.0 / p_max, 1.0 / p_min);
        let n = (((f_max - f_min) / df) as usize).max(2);
        let step = (f_max - f_min) / (n - 1) as f64;

        // Highest frequency first gives ascending periods.
        Ok((0..n).map(|i| 1.0 / (f_max - i as f64 * step)).collect())
    }

    /// Best box at a single trial period.
    fn evaluate_period(&self, data: &Prepared, period: f64, durations: &[f64]) -> BoxFit {
        let bin_width = durations[0] / self.params.oversample.max(1) as f64;
        let nbins = ((period / bin_width).ceil() as usize).max(1);

        let mut w = vec![0.0; nbins];
        let mut wy = vec![0.0; nbins];
        for ((&t, &y), &wi) in data.t.iter().zip(&data.y).zip(&data.w) {
            let phase = t.rem_euclid(period);
            let b = ((phase / bin_width) as usize).min(nbins - 1);
            w[b] += wi;
            wy[b] += wi * y;
        }

        // Cumulative sums over two periods so windows can wrap.
        let mut cw = vec![0.0; 2 * nbins + 1];
        let mut cwy = vec![0.0; 2 * nbins + 1];
        for j in 0..2 * nbins {
            cw[j + 1] = cw[j] + w[j % nbins];
            cwy[j + 1] = cwy[j] + wy[j % nbins];
        }

        let mut best = BoxFit {
            period,
            ..BoxFit::default()
        };
        let floor = data.w_total * 1e-12;

        for &duration in durations {
            let k = ((duration / bin_width).round() as usize).max(1);
            if k >= nbins {
                continue;
            }
            for s in 0..nbins {
                let w_in = cw[s + k] - cw[s];
                let w_out = data.w_total - w_in;
                if w_in <= floor || w_out <= floor {
                    continue;
                }
                let wy_in = cwy[s + k] - cwy[s];
                let y_in = wy_in / w_in;
                let y_out = (data.wy_total - wy_in) / w_out;
                let depth = y_out - y_in;
                if depth <= 0.0 {
                    continue;
                }

                let power = 0.5 * depth * depth * w_in * w_out / data.w_total;
                if power > best.power {
                    let mid = ((s as f64 + k as f64 / 2.0) * bin_width).rem_euclid(period);
                    best = BoxFit {
                        period,
                        power,
                        depth,
                        depth_err: (1.0 / w_in + 1.0 / w_out).sqrt(),
                        duration,
                        transit_time: data.t_ref + mid,
                    };
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{InjectedTransit, SyntheticLightCurve};
    use approx::assert_relative_eq;

    fn engine(min: f64, max: f64, ff: f64) -> BlsEngine {
        BlsEngine::new(BlsParams::with_range(min, max, ff))
    }

    #[test]
    fn period_grid_is_ascending_and_bounded() {
        let grid = engine(1.0, 10.0, 10.0).period_grid(27.0).unwrap();
        assert!(grid.len() > 2);
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(grid[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(*grid.last().unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn larger_frequency_factor_gives_coarser_grid() {
        let fine = engine(1.0, 10.0, 10.0).period_grid(27.0).unwrap();
        let coarse = engine(1.0, 10.0, 500.0).period_grid(27.0).unwrap();
        assert!(coarse.len() < fine.len());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(
            engine(5.0, 2.0, 10.0).period_grid(27.0),
            Err(BlsError::InvalidPeriodRange { .. })
        ));
        assert!(matches!(
            engine(0.04, 2.0, 10.0).usable_durations(),
            Err(BlsError::NoUsableDurations(_))
        ));
        assert!(matches!(engine(1.0, 2.0, 10.0).period_grid(0.0), Err(BlsError::ZeroBaseline)));
    }

    #[test]
    fn short_minimum_period_drops_long_durations() {
        let d = engine(0.12, 2.0, 10.0).usable_durations().unwrap();
        assert_eq!(d, vec![0.05, 0.10]);
    }

    #[test]
    fn recovers_injected_transit() {
        let lc = SyntheticLightCurve {
            baseline_days: 27.0,
            cadence_minutes: 10.0,
            noise_ppm: 1000.0,
            transits: vec![InjectedTransit {
                period: 3.2,
                epoch: 1.1,
                depth: 0.01,
                duration: 0.12,
                odd_depth_ratio: 1.0,
            }],
            seed: 7,
            ..SyntheticLightCurve::default()
        }
        .build()
        .unwrap();

        let pg = engine(1.0, 10.0, 10.0).search(&lc).unwrap();
        let best = pg.best().unwrap();
        assert_relative_eq!(best.period, 3.2, epsilon = 0.01);
        assert_relative_eq!(best.depth, 0.01, epsilon = 0.002);
        assert!(best.duration >= 0.05 && best.duration <= 0.15);

        // Transit time should land on one of the injected transits.
        let cycles = (best.transit_time - 1.1) / 3.2;
        assert!((cycles - cycles.round()).abs() * 3.2 < 0.05);
    }

    #[test]
    fn flat_data_has_no_strong_peak() {
        let lc = SyntheticLightCurve {
            baseline_days: 20.0,
            cadence_minutes: 20.0,
            noise_ppm: 500.0,
            seed: 3,
            ..SyntheticLightCurve::default()
        }
        .build()
        .unwrap();
        let pg = engine(1.0, 8.0, 20.0).search(&lc).unwrap();
        let best = pg.best().unwrap();
        // A pure-noise dip is far shallower than a percent-level transit.
        assert!(best.depth < 0.002);
    }

    #[test]
    fn without_window_removes_neighbourhood() {
        let fits: Vec<BoxFit> = (1..=10)
            .map(|p| BoxFit {
                period: p as f64,
                power: p as f64,
                ..BoxFit::default()
            })
            .collect();
        let pg = Periodogram::from_fits(fits);
        let masked = pg.without_window(5.0, 1.0);
        assert_eq!(masked.periods, vec![1.0, 2.0, 3.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(pg.best().unwrap().period, 10.0);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let t = ndarray::arr1(&[0.0, 1.0]);
        let f = ndarray::arr1(&[1.0]);
        let e = ndarray::arr1(&[1.0, 1.0]);
        assert!(matches!(
            engine(1.0, 2.0, 10.0).search_arrays(t.view(), f.view(), e.view()),
            Err(BlsError::LengthMismatch(2, 1, 2))
        ));
    }
}
