//! Phase folding, phase binning and box-depth measurement.
//!
//! Folding maps every timestamp onto orbital phase in cycles, in
//! `[-0.5, 0.5)`, with zero phase at mid-transit.  Depth measurements compare
//! the median flux inside an "in-window" band around a phase centre against
//! the median of an out-of-window baseline band:
//!
//! `depth = 1 − median(in) / median(baseline)`
//!
//! Empty bands and a non-positive baseline are reported as [`FoldError`]s
//! instead of producing NaN or panicking.

use serde::{Deserialize, Serialize};

use crate::lightcurve::LightCurve;
use crate::stats;

/// Errors raised while folding or measuring a folded light curve.
#[derive(Debug, thiserror::Error)]
pub enum FoldError {
    #[error("fold period must be positive and finite, got {0}")]
    InvalidPeriod(f64),

    #[error("no samples fall in the {0} window")]
    EmptyWindow(&'static str),

    #[error("baseline flux median is not positive ({0})")]
    NonPositiveBaseline(f64),
}

/// A light curve remapped onto orbital phase.
#[derive(Clone, Debug, Default)]
pub struct FoldedLightCurve {
    pub period: f64,
    pub epoch: f64,
    /// Phase in cycles, `-0.5 <= phase < 0.5`.
    pub phase: Vec<f64>,
    pub flux: Vec<f64>,
    pub flux_err: Vec<f64>,
    /// Transit number each sample belongs to (0 is the transit at `epoch`).
    pub transit_number: Vec<i64>,
}

impl FoldedLightCurve {
    pub fn len(&self) -> usize {
        self.phase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phase.is_empty()
    }

    /// Keep the samples whose transit number satisfies `keep`.
    pub fn filter_transits<F>(&self, keep: F) -> Self
    where
        F: Fn(i64) -> bool,
    {
        let idx: Vec<usize> = (0..self.len()).filter(|&i| keep(self.transit_number[i])).collect();
        Self {
            period: self.period,
            epoch: self.epoch,
            phase: idx.iter().map(|&i| self.phase[i]).collect(),
            flux: idx.iter().map(|&i| self.flux[i]).collect(),
            flux_err: idx.iter().map(|&i| self.flux_err[i]).collect(),
            transit_number: idx.iter().map(|&i| self.transit_number[i]).collect(),
        }
    }

    /// Distinct transit numbers present.
    pub fn transit_numbers(&self) -> Vec<i64> {
        let mut n = self.transit_number.clone();
        n.sort_unstable();
        n.dedup();
        n
    }
}

/// Fold `lc` at `period` with mid-transit at `epoch` (both in days, BTJD).
pub fn fold(lc: &LightCurve, period: f64, epoch: f64) -> Result<FoldedLightCurve, FoldError> {
    if !(period.is_finite() && period > 0.0) {
        return Err(FoldError::InvalidPeriod(period));
    }

    let mut folded = FoldedLightCurve {
        period,
        epoch,
        phase: Vec::with_capacity(lc.len()),
        flux: lc.flux().to_vec(),
        flux_err: lc.flux_err().to_vec(),
        transit_number: Vec::with_capacity(lc.len()),
    };

    for &t in lc.time().iter() {
        let cycles = (t - epoch) / period;
        let n = (cycles + 0.5).floor();
        folded.phase.push(cycles - n);
        folded.transit_number.push(n as i64);
    }

    Ok(folded)
}

/// In-window and baseline phase bands for a depth measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseWindows {
    /// Phase the in-window band is centred on.
    pub center: f64,
    /// In-window band is `|phase − center| < in_half_width`.
    pub in_half_width: f64,
    /// Baseline band is `baseline_min < |phase| < baseline_max`.
    pub baseline_min: f64,
    pub baseline_max: f64,
}

impl Default for PhaseWindows {
    fn default() -> Self {
        Self {
            center: 0.0,
            in_half_width: 0.02,
            baseline_min: 0.1,
            baseline_max: 0.4,
        }
    }
}

impl PhaseWindows {
    /// Windows sized to a transit: the in-window band covers the central
    /// half of the transit and the baseline starts well clear of ingress.
    pub fn for_transit(duration: f64, period: f64) -> Self {
        let frac = duration / period;
        Self {
            center: 0.0,
            in_half_width: 0.25 * frac,
            baseline_min: (1.5 * frac).max(0.1),
            baseline_max: 0.4,
        }
    }

    fn in_window(&self, phase: f64) -> bool {
        (phase - self.center).abs() < self.in_half_width
    }

    fn in_baseline(&self, phase: f64) -> bool {
        let a = phase.abs();
        a > self.baseline_min && a < self.baseline_max
    }
}

/// Depth of a dip measured on a folded light curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepthMeasurement {
    /// `1 − median(in) / median(baseline)`; positive means dimming.
    pub depth: f64,
    /// `std(in) / sqrt(n_in) / median(baseline)`.
    pub depth_err: f64,
    pub n_in: usize,
    pub n_baseline: usize,
}

impl DepthMeasurement {
    pub fn depth_ppm(&self) -> f64 {
        self.depth * 1e6
    }

    pub fn depth_err_ppm(&self) -> f64 {
        self.depth_err * 1e6
    }

    /// Depth in units of its uncertainty; zero when the uncertainty is zero.
    pub fn significance(&self) -> f64 {
        if self.depth_err > 0.0 {
            self.depth / self.depth_err
        } else {
            0.0
        }
    }
}

/// Measure the dip depth inside `windows` on a folded light curve.
pub fn measure_depth(
    folded: &FoldedLightCurve,
    windows: &PhaseWindows,
) -> Result<DepthMeasurement, FoldError> {
    let mut inside = Vec::new();
    let mut baseline = Vec::new();
    for (&phase, &flux) in folded.phase.iter().zip(&folded.flux) {
        if !flux.is_finite() {
            continue;
        }
        if windows.in_window(phase) {
            inside.push(flux);
        } else if windows.in_baseline(phase) {
            baseline.push(flux);
        }
    }

    let flux_in = stats::median(&inside).ok_or(FoldError::EmptyWindow("in-transit"))?;
    let flux_out = stats::median(&baseline).ok_or(FoldError::EmptyWindow("baseline"))?;
    if flux_out <= 0.0 {
        return Err(FoldError::NonPositiveBaseline(flux_out));
    }

    let scatter = stats::std_dev(&inside).unwrap_or(0.0);
    Ok(DepthMeasurement {
        depth: 1.0 - flux_in / flux_out,
        depth_err: scatter / (inside.len() as f64).sqrt() / flux_out,
        n_in: inside.len(),
        n_baseline: baseline.len(),
    })
}

/// One populated phase bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseBin {
    pub phase: f64,
    pub flux: f64,
    pub count: usize,
}

/// Median-bin the folded flux between `lo` and `hi` into `nbins` equal
/// bins.  Empty bins are omitted.
pub fn bin_phase(folded: &FoldedLightCurve, lo: f64, hi: f64, nbins: usize) -> Vec<PhaseBin> {
    if nbins == 0 || hi <= lo {
        return Vec::new();
    }
    let width = (hi - lo) / nbins as f64;
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); nbins];
    for (&phase, &flux) in folded.phase.iter().zip(&folded.flux) {
        if phase <= lo || phase >= hi || !flux.is_finite() {
            continue;
        }
        let b = (((phase - lo) / width) as usize).min(nbins - 1);
        buckets[b].push(flux);
    }

    buckets
        .iter()
        .enumerate()
        .filter_map(|(i, values)| {
            stats::median(values).map(|flux| PhaseBin {
                phase: lo + (i as f64 + 0.5) * width,
                flux,
                count: values.len(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_curve(period: f64, epoch: f64, depth: f64, duration: f64) -> LightCurve {
        let n = 4000;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let flux: Vec<f64> = time
            .iter()
            .map(|&t| {
                let x = (t - epoch) / period;
                let phase = x - (x + 0.5).floor();
                if (phase * period).abs() < duration / 2.0 {
                    1.0 - depth
                } else {
                    1.0
                }
            })
            .collect();
        LightCurve::from_vecs("test", time, flux, vec![1e-3; n]).unwrap()
    }

    #[test]
    fn phases_are_in_half_open_range() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.1);
        let folded = fold(&lc, 3.0, 1.0).unwrap();
        assert!(folded.phase.iter().all(|&p| (-0.5..0.5).contains(&p)));
        assert_eq!(folded.len(), lc.len());
    }

    #[test]
    fn transit_numbers_count_cycles() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.1);
        let folded = fold(&lc, 3.0, 1.0).unwrap();
        // t = 0..40 with epoch 1 and period 3 spans transits 0..=13
        assert_eq!(folded.transit_numbers(), (0..=13).collect::<Vec<i64>>());
    }

    #[test]
    fn invalid_period_is_rejected() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.1);
        assert!(matches!(fold(&lc, 0.0, 1.0), Err(FoldError::InvalidPeriod(_))));
        assert!(matches!(fold(&lc, f64::NAN, 1.0), Err(FoldError::InvalidPeriod(_))));
    }

    #[test]
    fn measures_box_depth() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.2);
        let folded = fold(&lc, 3.0, 1.0).unwrap();
        let m = measure_depth(&folded, &PhaseWindows::for_transit(0.2, 3.0)).unwrap();
        assert_relative_eq!(m.depth, 0.01, epsilon = 1e-9);
        assert!(m.n_in > 0);
        assert!(m.n_baseline > m.n_in);
    }

    #[test]
    fn empty_in_window_is_an_error() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.2);
        let folded = fold(&lc, 3.0, 1.0).unwrap();
        let windows = PhaseWindows {
            in_half_width: 0.0,
            ..PhaseWindows::default()
        };
        assert!(matches!(
            measure_depth(&folded, &windows),
            Err(FoldError::EmptyWindow("in-transit"))
        ));
    }

    #[test]
    fn zero_baseline_is_an_error() {
        let n = 100;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
        let lc = LightCurve::from_vecs("zero", time, vec![0.0; n], vec![1.0; n]).unwrap();
        let folded = fold(&lc, 2.0, 0.0).unwrap();
        assert!(matches!(
            measure_depth(&folded, &PhaseWindows::default()),
            Err(FoldError::NonPositiveBaseline(_))
        ));
    }

    #[test]
    fn odd_even_split_keeps_parity() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.2);
        let folded = fold(&lc, 3.0, 1.0).unwrap();
        let odd = folded.filter_transits(|n| n.rem_euclid(2) == 1);
        assert!(odd.transit_number.iter().all(|n| n % 2 == 1));
        let even = folded.filter_transits(|n| n.rem_euclid(2) == 0);
        assert_eq!(odd.len() + even.len(), folded.len());
    }

    #[test]
    fn binning_returns_medians_of_populated_bins() {
        let lc = box_curve(3.0, 1.0, 0.01, 0.2);
        let folded = fold(&lc, 3.0, 1.0).unwrap();
        let bins = bin_phase(&folded, -0.15, 0.15, 30);
        assert!(!bins.is_empty());
        let centre = bins
            .iter()
            .min_by(|a, b| a.phase.abs().partial_cmp(&b.phase.abs()).unwrap())
            .unwrap();
        assert_relative_eq!(centre.flux, 0.99, epsilon = 1e-9);
        let edge = bins.first().unwrap();
        assert_relative_eq!(edge.flux, 1.0, epsilon = 1e-9);
    }
}
