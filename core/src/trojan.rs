//! Co-orbital (Trojan) companion search at the L4/L5 Lagrange points.
//!
//! A Trojan body shares its planet's orbit 60° ahead of or behind it, so
//! once the light curve is folded at the planet's period its transits would
//! appear at phase −1/6 (L4) or +1/6 (L5).  The search measures the dip
//! depth in a band around each point against a baseline far from both the
//! planet and the Lagrange points.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::fold::{self, FoldError, FoldedLightCurve, PhaseWindows};
use crate::lightcurve::{self, LightCurve};

/// Phase of L4 in cycles (60° ahead of the planet).
pub const L4_PHASE: f64 = -1.0 / 6.0;

/// Phase of L5 in cycles (60° behind the planet).
pub const L5_PHASE: f64 = 1.0 / 6.0;

#[derive(Debug, thiserror::Error)]
pub enum TrojanError {
    #[error("known planet period must be positive, got {0}")]
    InvalidPeriod(f64),

    #[error(transparent)]
    Fold(#[from] FoldError),
}

/// A confirmed planet whose orbit is searched for companions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownPlanet {
    pub name: String,
    /// Orbital period in days.
    pub period: f64,
    /// Mid-transit epoch, BJD or BTJD.
    pub epoch: f64,
    /// Literature transit depth in ppm.
    pub depth_ppm: f64,
}

impl KnownPlanet {
    /// Epoch in the TESS time system.
    pub fn epoch_btjd(&self) -> f64 {
        lightcurve::to_btjd(self.epoch)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LagrangePoint {
    L4,
    L5,
}

impl LagrangePoint {
    pub fn phase(self) -> f64 {
        match self {
            LagrangePoint::L4 => L4_PHASE,
            LagrangePoint::L5 => L5_PHASE,
        }
    }
}

impl std::fmt::Display for LagrangePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LagrangePoint::L4 => f.write_str("L4"),
            LagrangePoint::L5 => f.write_str("L5"),
        }
    }
}

/// Search geometry and decision thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrojanParams {
    /// Half-width of the band around each Lagrange point, in cycles.
    pub half_width: f64,
    pub baseline_min: f64,
    pub baseline_max: f64,
    /// |significance| above this counts as a detection.
    pub detection_sigma: f64,
    /// The measured planet depth must lie within this fraction of the
    /// literature depth.
    pub depth_tolerance: f64,
}

impl Default for TrojanParams {
    fn default() -> Self {
        Self {
            half_width: 0.05,
            baseline_min: 0.3,
            baseline_max: 0.5,
            detection_sigma: 3.0,
            depth_tolerance: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownPlanetValidation {
    pub expected_depth_ppm: f64,
    pub measured_depth_ppm: f64,
    pub matches: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LagrangePointMeasurement {
    pub point: LagrangePoint,
    /// Positive means dimming.
    pub depth_ppm: f64,
    pub uncertainty_ppm: f64,
    pub significance_sigma: f64,
    pub n_points: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrojanResult {
    pub target: String,
    pub planet: KnownPlanet,
    pub validation: KnownPlanetValidation,
    pub l4: LagrangePointMeasurement,
    pub l5: LagrangePointMeasurement,
    pub detection_sigma: f64,
    /// 3σ depth limit when neither point shows a detection.
    pub upper_limit_ppm: Option<f64>,
    /// Predicted mid-transit times of the known planet inside the data.
    pub transit_times: Vec<f64>,
}

impl TrojanResult {
    /// Lagrange points whose dip exceeds the detection threshold.
    pub fn detections(&self) -> Vec<LagrangePoint> {
        [&self.l4, &self.l5]
            .into_iter()
            .filter(|m| m.significance_sigma.abs() > self.detection_sigma)
            .map(|m| m.point)
            .collect()
    }
}

/// Trojan search around one known planet.
#[derive(Clone, Debug)]
pub struct TrojanSearch {
    planet: KnownPlanet,
    params: TrojanParams,
}

impl TrojanSearch {
    pub fn new(planet: KnownPlanet, params: TrojanParams) -> Self {
        Self { planet, params }
    }

    pub fn planet(&self) -> &KnownPlanet {
        &self.planet
    }

    fn fold(&self, lc: &LightCurve) -> Result<FoldedLightCurve, TrojanError> {
        if !(self.planet.period > 0.0) {
            return Err(TrojanError::InvalidPeriod(self.planet.period));
        }
        Ok(fold::fold(lc, self.planet.period, self.planet.epoch_btjd())?)
    }

    /// Check that the known planet's transit is recovered at its literature
    /// depth.
    pub fn validate_known_planet(&self, lc: &LightCurve) -> Result<KnownPlanetValidation, TrojanError> {
        let folded = self.fold(lc)?;
        let measured = fold::measure_depth(&folded, &PhaseWindows::default())?.depth_ppm();
        let expected = self.planet.depth_ppm;
        let matches = (measured - expected).abs() < expected * self.params.depth_tolerance;
        info!(
            "Known planet depth: expected {:.1} ppm, measured {:.1} ppm ({})",
            expected,
            measured,
            if matches { "match" } else { "mismatch" }
        );
        Ok(KnownPlanetValidation {
            expected_depth_ppm: expected,
            measured_depth_ppm: measured,
            matches,
        })
    }

    /// Dip depth in the band around one Lagrange point.
    pub fn measure_point(
        &self,
        folded: &FoldedLightCurve,
        point: LagrangePoint,
    ) -> Result<LagrangePointMeasurement, TrojanError> {
        let windows = PhaseWindows {
            center: point.phase(),
            in_half_width: self.params.half_width,
            baseline_min: self.params.baseline_min,
            baseline_max: self.params.baseline_max,
        };
        let d = fold::measure_depth(folded, &windows)?;
        Ok(LagrangePointMeasurement {
            point,
            depth_ppm: d.depth_ppm(),
            uncertainty_ppm: d.depth_err_ppm(),
            significance_sigma: d.significance(),
            n_points: d.n_in,
        })
    }

    /// Predicted transit times of the known planet within the data span.
    pub fn transit_times(&self, lc: &LightCurve) -> Vec<f64> {
        let (start, end) = lc.time_range();
        let (p, t0) = (self.planet.period, self.planet.epoch_btjd());
        if !(p > 0.0) {
            return Vec::new();
        }
        let first = ((start - t0) / p).ceil() as i64;
        let last = ((end - t0) / p).floor() as i64;
        (first..=last).map(|k| t0 + k as f64 * p).collect()
    }

    /// Validation, both Lagrange points and the transit ephemeris.
    pub fn run(&self, lc: &LightCurve) -> Result<TrojanResult, TrojanError> {
        let validation = self.validate_known_planet(lc)?;
        if !validation.matches {
            warn!("Known planet depth does not match the literature value");
        }

        let folded = self.fold(lc)?;
        let l4 = self.measure_point(&folded, LagrangePoint::L4)?;
        let l5 = self.measure_point(&folded, LagrangePoint::L5)?;
        for m in [&l4, &l5] {
            info!(
                "{}: depth {:.1} ± {:.1} ppm ({:.2}σ, {} points)",
                m.point, m.depth_ppm, m.uncertainty_ppm, m.significance_sigma, m.n_points
            );
        }

        let threshold = self.params.detection_sigma;
        let detected = l4.significance_sigma.abs() > threshold || l5.significance_sigma.abs() > threshold;
        let upper_limit_ppm = if detected {
            None
        } else {
            Some(threshold * l4.uncertainty_ppm.max(l5.uncertainty_ppm))
        };

        Ok(TrojanResult {
            target: lc.target.clone(),
            planet: self.planet.clone(),
            validation,
            l4,
            l5,
            detection_sigma: threshold,
            upper_limit_ppm,
            transit_times: self.transit_times(lc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{InjectedTransit, SyntheticLightCurve};
    use approx::assert_relative_eq;

    fn planet() -> KnownPlanet {
        KnownPlanet {
            name: "test b".to_string(),
            period: 2.2,
            epoch: 1325.5,
            depth_ppm: 5000.0,
        }
    }

    fn curve(trojan_depth: f64) -> LightCurve {
        let mut transits = vec![InjectedTransit::new(2.2, 1325.5, 0.005, 0.15)];
        if trojan_depth > 0.0 {
            // L5 trails the planet by a sixth of an orbit.
            transits.push(InjectedTransit::new(2.2, 1325.5 + 2.2 / 6.0, trojan_depth, 0.15));
        }
        SyntheticLightCurve {
            cadence_minutes: 10.0,
            noise_ppm: 300.0,
            transits,
            seed: 21,
            ..SyntheticLightCurve::default()
        }
        .build()
        .unwrap()
    }

    #[test]
    fn no_trojan_gives_upper_limit() {
        let search = TrojanSearch::new(planet(), TrojanParams::default());
        let result = search.run(&curve(0.0)).unwrap();
        assert!(result.validation.matches);
        assert!(result.detections().is_empty());
        assert!(result.upper_limit_ppm.unwrap() > 0.0);
        assert!(result.l4.n_points > 0 && result.l5.n_points > 0);
    }

    #[test]
    fn deep_trojan_at_l5_is_detected() {
        let search = TrojanSearch::new(planet(), TrojanParams::default());
        let result = search.run(&curve(0.003)).unwrap();
        assert_eq!(result.detections(), vec![LagrangePoint::L5]);
        assert!(result.upper_limit_ppm.is_none());
    }

    #[test]
    fn transit_times_fall_inside_data() {
        let lc = curve(0.0);
        let search = TrojanSearch::new(planet(), TrojanParams::default());
        let times = search.transit_times(&lc);
        let (start, end) = lc.time_range();
        assert!(!times.is_empty());
        assert!(times.iter().all(|&t| t >= start && t <= end));
        assert_relative_eq!(times[0], 1325.5);
    }

    #[test]
    fn bjd_epoch_is_converted() {
        let p = KnownPlanet {
            epoch: 2_454_954.357,
            ..planet()
        };
        assert_relative_eq!(p.epoch_btjd(), -2045.643, epsilon = 1e-6);
    }
}
