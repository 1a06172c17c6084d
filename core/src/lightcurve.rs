//! The cleaned, time-ordered photometric series every later stage works on.
//!
//! A [`LightCurve`] is an immutable value: each preprocessing step builds a
//! new one rather than editing samples in place.  Construction enforces the
//! one invariant the rest of the crate relies on, namely that time is
//! strictly increasing.

use ndarray::{Array1, ArrayView1};

/// Offset between Barycentric Julian Date and the TESS time system (BTJD).
pub const BTJD_OFFSET: f64 = 2_457_000.0;

/// Convert an epoch quoted in BJD to BTJD.  Values that already look like
/// BTJD are returned unchanged.
pub fn to_btjd(epoch: f64) -> f64 {
    if epoch > 2_000_000.0 {
        epoch - BTJD_OFFSET
    } else {
        epoch
    }
}

/// Errors raised when a light curve would violate its invariants.
#[derive(Debug, thiserror::Error)]
pub enum LightCurveError {
    #[error("light curve has no samples")]
    Empty,

    #[error("column '{column}' has {len} samples but time has {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        len: usize,
    },

    #[error("time is not strictly increasing at sample {index} ({previous} -> {current})")]
    NotIncreasing {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("time contains a non-finite value at sample {0}")]
    NonFiniteTime(usize),
}

/// A single-target light curve: time (BTJD days), flux, flux uncertainty and
/// the TESS quality flag for every sample.
#[derive(Clone, Debug)]
pub struct LightCurve {
    /// Catalog identifier, e.g. `"TIC 307210830"`.
    pub target: String,
    time: Array1<f64>,
    flux: Array1<f64>,
    flux_err: Array1<f64>,
    quality: Array1<u32>,
    /// Sector numbers that contributed samples.
    pub sectors: Vec<u32>,
}

impl LightCurve {
    /// Build a light curve, checking column lengths and time ordering.
    pub fn new(
        target: impl Into<String>,
        time: Array1<f64>,
        flux: Array1<f64>,
        flux_err: Array1<f64>,
        quality: Array1<u32>,
    ) -> Result<Self, LightCurveError> {
        let n = time.len();
        if n == 0 {
            return Err(LightCurveError::Empty);
        }
        for (column, len) in [("flux", flux.len()), ("flux_err", flux_err.len()), ("quality", quality.len())] {
            if len != n {
                return Err(LightCurveError::LengthMismatch {
                    column,
                    expected: n,
                    len,
                });
            }
        }
        for (i, &t) in time.iter().enumerate() {
            if !t.is_finite() {
                return Err(LightCurveError::NonFiniteTime(i));
            }
            if i > 0 && t <= time[i - 1] {
                return Err(LightCurveError::NotIncreasing {
                    index: i,
                    previous: time[i - 1],
                    current: t,
                });
            }
        }

        Ok(Self {
            target: target.into(),
            time,
            flux,
            flux_err,
            quality,
            sectors: Vec::new(),
        })
    }

    /// Convenience constructor from plain vectors with all quality flags
    /// cleared.
    pub fn from_vecs(
        target: impl Into<String>,
        time: Vec<f64>,
        flux: Vec<f64>,
        flux_err: Vec<f64>,
    ) -> Result<Self, LightCurveError> {
        let n = time.len();
        Self::new(
            target,
            Array1::from(time),
            Array1::from(flux),
            Array1::from(flux_err),
            Array1::zeros(n),
        )
    }

    pub fn with_sectors(mut self, sectors: Vec<u32>) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    pub fn flux(&self) -> ArrayView1<'_, f64> {
        self.flux.view()
    }

    pub fn flux_err(&self) -> ArrayView1<'_, f64> {
        self.flux_err.view()
    }

    pub fn quality(&self) -> ArrayView1<'_, u32> {
        self.quality.view()
    }

    /// First and last timestamp.
    pub fn time_range(&self) -> (f64, f64) {
        (self.time[0], self.time[self.len() - 1])
    }

    /// Total time span covered, in days.
    pub fn baseline(&self) -> f64 {
        let (start, end) = self.time_range();
        end - start
    }

    /// Median spacing between consecutive samples, in days.
    pub fn median_cadence(&self) -> Option<f64> {
        let dt: Vec<f64> = self
            .time
            .windows(2)
            .into_iter()
            .map(|w| w[1] - w[0])
            .collect();
        crate::stats::median(&dt)
    }

    /// Keep only the samples whose mask entry is `true`.  Order is preserved,
    /// so the time invariant still holds.
    pub fn retain(&self, keep: &[bool]) -> Result<Self, LightCurveError> {
        let idx: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect();
        let lc = Self::new(
            self.target.clone(),
            self.time.select(ndarray::Axis(0), &idx),
            self.flux.select(ndarray::Axis(0), &idx),
            self.flux_err.select(ndarray::Axis(0), &idx),
            self.quality.select(ndarray::Axis(0), &idx),
        )?;
        Ok(lc.with_sectors(self.sectors.clone()))
    }

    /// Replace flux and uncertainty while keeping the time axis.
    pub fn with_flux(
        &self,
        flux: Array1<f64>,
        flux_err: Array1<f64>,
    ) -> Result<Self, LightCurveError> {
        let lc = Self::new(
            self.target.clone(),
            self.time.clone(),
            flux,
            flux_err,
            self.quality.clone(),
        )?;
        Ok(lc.with_sectors(self.sectors.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_unsorted_time() {
        let err = LightCurve::from_vecs("t", vec![0.0, 2.0, 1.0], vec![1.0; 3], vec![0.001; 3])
            .unwrap_err();
        assert!(matches!(err, LightCurveError::NotIncreasing { index: 2, .. }));
    }

    #[test]
    fn rejects_duplicate_time() {
        let err = LightCurve::from_vecs("t", vec![0.0, 1.0, 1.0], vec![1.0; 3], vec![0.001; 3])
            .unwrap_err();
        assert!(matches!(err, LightCurveError::NotIncreasing { .. }));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = LightCurve::from_vecs("t", vec![0.0, 1.0], vec![1.0; 3], vec![0.001; 2])
            .unwrap_err();
        assert!(matches!(err, LightCurveError::LengthMismatch { column: "flux", .. }));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            LightCurve::from_vecs("t", vec![], vec![], vec![]),
            Err(LightCurveError::Empty)
        ));
    }

    #[test]
    fn retain_keeps_order_and_sectors() {
        let lc = LightCurve::from_vecs("t", vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0, 4.0], vec![0.1; 4])
            .unwrap()
            .with_sectors(vec![5]);
        let kept = lc.retain(&[true, false, true, true]).unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept.time().to_vec(), vec![0.0, 2.0, 3.0]);
        assert_eq!(kept.sectors, vec![5]);
    }

    #[test]
    fn baseline_and_cadence() {
        let lc = LightCurve::from_vecs("t", vec![10.0, 10.5, 11.0, 12.0], vec![1.0; 4], vec![0.1; 4]).unwrap();
        assert_relative_eq!(lc.baseline(), 2.0);
        assert_relative_eq!(lc.median_cadence().unwrap(), 0.5);
    }

    #[test]
    fn bjd_to_btjd() {
        assert_relative_eq!(to_btjd(2_458_679.0), 1679.0);
        assert_relative_eq!(to_btjd(1679.0), 1679.0);
    }
}
