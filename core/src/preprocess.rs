//! Light-curve cleaning: outlier removal, detrending and normalisation.
//!
//! The three steps mirror what the analysis always does before a period
//! search:
//!
//! 1. **Outlier removal**: iterative 5σ clipping about the median.
//! 2. **Flattening**: a Savitzky–Golay filter (window 401 samples,
//!    quadratic) estimates slow stellar and instrumental variability per
//!    contiguous segment; the flux is divided by that trend.  Points that
//!    sit more than 3σ from the trend are masked and the trend is refit,
//!    three times, so transits do not drag the trend down.
//! 3. **Normalisation**: divide by the median flux.
//!
//! Each step returns a new [`LightCurve`].

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::lightcurve::{LightCurve, LightCurveError};
use crate::stats;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("window length must be odd and greater than polyorder ({window} vs {polyorder})")]
    BadWindow { window: usize, polyorder: usize },

    #[error("Savitzky-Golay normal equations are singular")]
    SingularFit,

    #[error("detrending produced a non-positive trend at sample {0}")]
    NonPositiveTrend(usize),

    #[error("median flux is not positive ({0})")]
    NonPositiveMedian(f64),

    #[error(transparent)]
    LightCurve(#[from] LightCurveError),
}

/// Preprocessing configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Clipping threshold for outlier removal, in σ.
    pub outlier_sigma: f64,
    pub outlier_max_iters: usize,
    /// Savitzky–Golay window, in samples.  Must be odd.
    pub window_length: usize,
    pub polyorder: usize,
    /// Trend refits with residual clipping.
    pub flatten_iters: usize,
    /// Residual clipping threshold while fitting the trend, in σ.
    pub flatten_sigma: f64,
    /// Gaps longer than this many median cadences split the curve into
    /// independently detrended segments.
    pub break_tolerance: f64,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            outlier_sigma: 5.0,
            outlier_max_iters: 5,
            window_length: 401,
            polyorder: 2,
            flatten_iters: 3,
            flatten_sigma: 3.0,
            break_tolerance: 5.0,
        }
    }
}

/// Result of the full preprocessing chain.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    /// Cleaned, flattened, normalised light curve.
    pub light_curve: LightCurve,
    /// Trend divided out by the flattening step, sampled on the cleaned
    /// light curve's timestamps.
    pub trend: Array1<f64>,
    /// Samples removed as outliers.
    pub n_outliers: usize,
}

/// Runs the preprocessing chain with a fixed configuration.
#[derive(Clone, Debug, Default)]
pub struct Preprocessor {
    params: PreprocessParams,
}

impl Preprocessor {
    pub fn new(params: PreprocessParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PreprocessParams {
        &self.params
    }

    /// Outlier removal, flattening and normalisation in sequence.
    pub fn run(&self, lc: &LightCurve) -> Result<Preprocessed, PreprocessError> {
        let clean = remove_outliers(lc, self.params.outlier_sigma, self.params.outlier_max_iters)?;
        let n_outliers = lc.len() - clean.len();
        info!(
            "Removed {} outliers ({:.1}%)",
            n_outliers,
            100.0 * n_outliers as f64 / lc.len() as f64
        );

        let (flat, trend) = flatten(&clean, &self.params)?;
        info!(
            "Applied Savitzky-Golay detrending (window={})",
            self.params.window_length
        );

        let light_curve = normalize(&flat)?;
        Ok(Preprocessed {
            light_curve,
            trend,
            n_outliers,
        })
    }
}

/// Drop samples more than `sigma` standard deviations from the median flux.
pub fn remove_outliers(
    lc: &LightCurve,
    sigma: f64,
    max_iters: usize,
) -> Result<LightCurve, PreprocessError> {
    let flux = lc.flux().to_vec();
    let keep = stats::sigma_clip_mask(&flux, sigma, max_iters);
    Ok(lc.retain(&keep)?)
}

/// Divide flux and uncertainty by the median flux.
pub fn normalize(lc: &LightCurve) -> Result<LightCurve, PreprocessError> {
    let flux = lc.flux().to_vec();
    let m = stats::median(&flux).unwrap_or(f64::NAN);
    if !(m > 0.0) {
        return Err(PreprocessError::NonPositiveMedian(m));
    }
    Ok(lc.with_flux(lc.flux().mapv(|f| f / m), lc.flux_err().mapv(|e| e / m))?)
}

/// Detrend `lc` with an iteratively clipped Savitzky–Golay filter.
///
/// Returns the flattened light curve and the trend that was divided out.
pub fn flatten(
    lc: &LightCurve,
    params: &PreprocessParams,
) -> Result<(LightCurve, Array1<f64>), PreprocessError> {
    let window = params.window_length;
    if window % 2 == 0 || window <= params.polyorder {
        return Err(PreprocessError::BadWindow {
            window,
            polyorder: params.polyorder,
        });
    }

    let time = lc.time().to_vec();
    let flux = lc.flux().to_vec();
    let segments = split_segments(&time, params.break_tolerance);
    debug!("Detrending {} contiguous segments", segments.len());

    let mut mask: Vec<bool> = flux.iter().map(|f| f.is_finite()).collect();
    let mut trend = vec![f64::NAN; flux.len()];

    for _ in 0..params.flatten_iters.max(1) {
        for &(start, end) in &segments {
            fit_segment_trend(&time, &flux, &mask, start, end, window, params.polyorder, &mut trend)?;
        }

        let residual: Vec<f64> = flux.iter().zip(&trend).map(|(f, t)| f - t).collect();
        let keep = stats::sigma_clip_mask(&residual, params.flatten_sigma, 5);
        for (m, k) in mask.iter_mut().zip(keep) {
            *m = *m && k;
        }
    }

    if let Some(i) = trend.iter().position(|&t| !(t > 0.0)) {
        return Err(PreprocessError::NonPositiveTrend(i));
    }

    let trend = Array1::from(trend);
    let flat_flux = &lc.flux() / &trend;
    let flat_err = &lc.flux_err() / &trend;
    Ok((lc.with_flux(flat_flux, flat_err)?, trend))
}

/// Split sample indices into `[start, end)` runs separated by gaps longer
/// than `break_tolerance` median cadences.
fn split_segments(time: &[f64], break_tolerance: f64) -> Vec<(usize, usize)> {
    if time.is_empty() {
        return Vec::new();
    }
    let dt: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();
    let Some(cadence) = stats::median(&dt) else {
        return vec![(0, time.len())];
    };

    let mut segments = Vec::new();
    let mut start = 0;
    for (i, &gap) in dt.iter().enumerate() {
        if gap > break_tolerance * cadence {
            segments.push((start, i + 1));
            start = i + 1;
        }
    }
    segments.push((start, time.len()));
    segments
}

/// Fit the trend over one segment using unmasked samples only, then fill
/// masked samples by linear interpolation in time.
#[allow(clippy::too_many_arguments)]
fn fit_segment_trend(
    time: &[f64],
    flux: &[f64],
    mask: &[bool],
    start: usize,
    end: usize,
    window: usize,
    polyorder: usize,
    trend: &mut [f64],
) -> Result<(), PreprocessError> {
    let idx: Vec<usize> = (start..end).filter(|&i| mask[i]).collect();
    if idx.is_empty() {
        let fallback = stats::median(&flux[start..end]).unwrap_or(1.0);
        trend[start..end].iter_mut().for_each(|t| *t = fallback);
        return Ok(());
    }

    let ys: Vec<f64> = idx.iter().map(|&i| flux[i]).collect();
    let smooth = savgol_filter(&ys, window, polyorder)?;
    let xs: Vec<f64> = idx.iter().map(|&i| time[i]).collect();

    for i in start..end {
        trend[i] = stats::interpolate(&xs, &smooth, time[i]).unwrap_or(f64::NAN);
    }
    Ok(())
}

/// Savitzky–Golay smoothing of `y`.
///
/// Interior samples use the centred least-squares polynomial; the first and
/// last half-window samples evaluate the polynomial fitted to the first or
/// last full window.  Inputs shorter than `window` shrink the window to the
/// largest odd length that fits; inputs too short for the polynomial are
/// replaced by their median.
pub fn savgol_filter(y: &[f64], window: usize, polyorder: usize) -> Result<Vec<f64>, PreprocessError> {
    let n = y.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut window = window.min(n);
    if window % 2 == 0 {
        window -= 1;
    }
    if window <= polyorder {
        let m = stats::median(y).unwrap_or(f64::NAN);
        return Ok(vec![m; n]);
    }

    let half = window / 2;
    let centre = savgol_weights(window, polyorder, 0.0)?;
    let mut out = vec![0.0; n];

    for i in half..n - half {
        out[i] = centre
            .iter()
            .zip(&y[i - half..=i + half])
            .map(|(w, v)| w * v)
            .sum();
    }

    for i in 0..half {
        let head = savgol_weights(window, polyorder, i as f64 - half as f64)?;
        out[i] = head.iter().zip(&y[..window]).map(|(w, v)| w * v).sum();

        let j = n - 1 - i;
        let tail = savgol_weights(window, polyorder, half as f64 - i as f64)?;
        out[j] = tail.iter().zip(&y[n - window..]).map(|(w, v)| w * v).sum();
    }

    Ok(out)
}

/// Singular values below this are treated as zero in the least-squares fit.
const SVD_TOLERANCE: f64 = 1e-12;

/// Weights that evaluate the least-squares polynomial of degree `polyorder`
/// through a `window`-sample window at `offset` samples from its centre.
fn savgol_weights(window: usize, polyorder: usize, offset: f64) -> Result<Vec<f64>, PreprocessError> {
    let half = (window / 2) as f64;
    let scale = if half > 0.0 { half } else { 1.0 };
    let m = polyorder + 1;

    // Vandermonde matrix A[i][j] = x_i^j over the scaled window.
    let a = DMatrix::from_fn(window, m, |i, j| ((i as f64 - half) / scale).powi(j as i32));
    let svd = a.svd(true, true);
    if svd.rank(SVD_TOLERANCE) < m {
        return Err(PreprocessError::SingularFit);
    }
    let pinv = svd
        .pseudo_inverse(SVD_TOLERANCE)
        .map_err(|_| PreprocessError::SingularFit)?;

    // Evaluating the fitted polynomial at x0 is basisᵀ · A⁺ applied to y.
    let x0 = offset / scale;
    let basis = DVector::from_fn(m, |j, _| x0.powi(j as i32));
    Ok(pinv.tr_mul(&basis).iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(time: Vec<f64>, flux: Vec<f64>) -> LightCurve {
        let n = time.len();
        LightCurve::from_vecs("test", time, flux, vec![1e-3; n]).unwrap()
    }

    #[test]
    fn savgol_reproduces_quadratic_exactly() {
        let y: Vec<f64> = (0..50).map(|i| {
            let x = i as f64;
            2.0 + 0.3 * x - 0.01 * x * x
        }).collect();
        let smooth = savgol_filter(&y, 11, 2).unwrap();
        for (a, b) in y.iter().zip(&smooth) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn savgol_shrinks_window_for_short_input() {
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let smooth = savgol_filter(&y, 401, 2).unwrap();
        for (a, b) in y.iter().zip(&smooth) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn savgol_centre_weights_sum_to_one() {
        let w = savgol_weights(7, 2, 0.0).unwrap();
        assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        // classic 7-point quadratic coefficients: (-2, 3, 6, 7, 6, 3, -2) / 21
        assert_relative_eq!(w[3], 7.0 / 21.0, epsilon = 1e-12);
        assert_relative_eq!(w[0], -2.0 / 21.0, epsilon = 1e-12);
    }

    #[test]
    fn savgol_edge_weights_extrapolate_the_window_fit() {
        // Evaluating at the window's last sample reproduces a quadratic there.
        let w = savgol_weights(9, 2, 4.0).unwrap();
        let y: Vec<f64> = (0..9).map(|i| 1.0 + 0.5 * i as f64 - 0.2 * (i * i) as f64).collect();
        let value: f64 = w.iter().zip(&y).map(|(a, b)| a * b).sum();
        assert_relative_eq!(value, y[8], epsilon = 1e-9);
    }

    #[test]
    fn underdetermined_fit_is_singular() {
        assert!(matches!(savgol_weights(1, 2, 0.0), Err(PreprocessError::SingularFit)));
        assert!(matches!(savgol_weights(3, 3, 0.0), Err(PreprocessError::SingularFit)));
    }

    #[test]
    fn segments_split_on_gaps() {
        let time = vec![0.0, 1.0, 2.0, 3.0, 20.0, 21.0, 22.0];
        assert_eq!(split_segments(&time, 5.0), vec![(0, 4), (4, 7)]);
    }

    #[test]
    fn outliers_are_removed() {
        let n = 500;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let mut flux: Vec<f64> = (0..n).map(|i| 1.0 + 1e-4 * ((i % 5) as f64 - 2.0)).collect();
        flux[100] = 1.5;
        flux[300] = 0.2;
        let lc = curve(time, flux);
        let clean = remove_outliers(&lc, 5.0, 5).unwrap();
        assert_eq!(clean.len(), n - 2);
    }

    #[test]
    fn flatten_removes_slow_trend() {
        let n = 2000;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let flux: Vec<f64> = time.iter().map(|&t| 100.0 * (1.0 + 0.01 * (t / 5.0).sin())).collect();
        let lc = curve(time, flux);
        let (flat, trend) = flatten(&lc, &PreprocessParams::default()).unwrap();
        assert_eq!(trend.len(), n);
        for f in flat.flux().iter() {
            assert_relative_eq!(*f, 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn flatten_rejects_even_window() {
        let lc = curve(vec![0.0, 1.0, 2.0], vec![1.0; 3]);
        let params = PreprocessParams {
            window_length: 400,
            ..PreprocessParams::default()
        };
        assert!(matches!(flatten(&lc, &params), Err(PreprocessError::BadWindow { .. })));
    }

    #[test]
    fn normalize_divides_by_median() {
        let lc = curve(vec![0.0, 1.0, 2.0], vec![10.0, 20.0, 30.0]);
        let norm = normalize(&lc).unwrap();
        assert_eq!(norm.flux().to_vec(), vec![0.5, 1.0, 1.5]);
        assert_relative_eq!(norm.flux_err()[0], 1e-3 / 20.0);
    }

    #[test]
    fn full_chain_keeps_time_order() {
        let n = 3000;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.01).collect();
        let mut flux: Vec<f64> = time.iter().map(|&t| 50.0 + 0.2 * (t / 3.0).cos()).collect();
        flux[1234] = 80.0;
        let lc = curve(time, flux);
        let out = Preprocessor::default().run(&lc).unwrap();
        assert_eq!(out.n_outliers, 1);
        assert_eq!(out.trend.len(), out.light_curve.len());
        let median = stats::median(&out.light_curve.flux().to_vec()).unwrap();
        assert_relative_eq!(median, 1.0, epsilon = 1e-12);
    }
}
