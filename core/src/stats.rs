//! Small robust-statistics helpers used by the preprocessor, the ranker and
//! the vetting checks.
//!
//! All functions skip NaN inputs where a "skip" makes sense and return
//! `None` rather than panicking on empty input.

use std::cmp::Ordering;

/// Scale factor turning a median absolute deviation into a Gaussian σ.
pub const MAD_TO_SIGMA: f64 = 1.4826;

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    v.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Median of the non-NaN values. Even-length input averages the two middle
/// values.
pub fn median(values: &[f64]) -> Option<f64> {
    let v = sorted_finite(values);
    if v.is_empty() {
        return None;
    }
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Median absolute deviation about the median.
pub fn mad(values: &[f64]) -> Option<f64> {
    let m = median(values)?;
    let devs: Vec<f64> = values
        .iter()
        .filter(|x| !x.is_nan())
        .map(|&x| (x - m).abs())
        .collect();
    median(&devs)
}

/// Arithmetic mean of the non-NaN values.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .filter(|x| !x.is_nan())
        .fold((0.0, 0usize), |(s, n), &x| (s + x, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Population standard deviation (divides by N).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let (ss, n) = values
        .iter()
        .filter(|x| !x.is_nan())
        .fold((0.0, 0usize), |(s, n), &x| (s + (x - m).powi(2), n + 1));
    Some((ss / n as f64).sqrt())
}

/// Pearson correlation coefficient.
///
/// Returns `None` for mismatched or empty inputs and when either series has
/// no variance.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for &(a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::MIN_POSITIVE || var_y <= f64::MIN_POSITIVE {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Iterative sigma clipping about the median, using the standard deviation
/// as the scale. Returns a keep-mask the same length as `values`; NaN values
/// are never kept.
///
/// Iteration stops after `max_iters` passes or as soon as a pass rejects
/// nothing new.
pub fn sigma_clip_mask(values: &[f64], sigma: f64, max_iters: usize) -> Vec<bool> {
    let mut keep: Vec<bool> = values.iter().map(|v| v.is_finite()).collect();

    for _ in 0..max_iters {
        let kept: Vec<f64> = values
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(&v, _)| v)
            .collect();
        let (Some(centre), Some(scale)) = (median(&kept), std_dev(&kept)) else {
            break;
        };
        if scale <= 0.0 {
            break;
        }

        let mut changed = false;
        for (k, &v) in keep.iter_mut().zip(values) {
            if *k && (v - centre).abs() > sigma * scale {
                *k = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    keep
}

/// Linear interpolation of `(xs, ys)` at `x`. `xs` must be ascending;
/// values outside the range take the nearest endpoint.
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> Option<f64> {
    if xs.is_empty() || xs.len() != ys.len() {
        return None;
    }
    let idx = xs.partition_point(|&v| v < x);
    if idx == 0 {
        return Some(ys[0]);
    }
    if idx == xs.len() {
        return Some(ys[xs.len() - 1]);
    }
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let (y0, y1) = (ys[idx - 1], ys[idx]);
    if x1 == x0 {
        return Some(y0);
    }
    Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}
