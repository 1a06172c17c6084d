//! Candidate vetting: five checks and a pure accept/reject decision.
//!
//! Most periodogram peaks are not planets.  Each [`TransitCandidate`] is put
//! through a fixed sequence of tests, and the verdict is a pure function of
//! the resulting statistics, so it can be recomputed (or unit-tested) without
//! touching the data again.
//!
//! # Checks
//!
//! | # | Check | Statistic | Fails when | Severity |
//! |---|-------|-----------|------------|----------|
//! | 1 | Bootstrap stability | σ(P)/P over resampled searches | ≥ 1e-3 | soft |
//! | 2 | False-alarm probability | fraction of permuted searches at least as strong | ≥ 0.01 | soft |
//! | 3 | Depth plausibility | implied planet radius | < 0.383 R⊕ or depth ≤ 0 | hard |
//! | 4 | Odd/even consistency | depth difference in combined σ | > 3 | hard |
//! | 5 | Activity correlation | Pearson r of residual flux vs. proxy | abs(r) > 0.3 | hard |
//!
//! # Decision
//!
//! Any hard failure rejects outright and only the hard failures are listed.
//! Otherwise any soft failure rejects.  Otherwise an inconclusive check
//! (odd/even on a too-shallow signal, or a missing activity proxy) yields
//! [`Verdict::Inconclusive`].  Everything else is accepted.

use std::time::Instant;

use log::{debug, info, warn};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::activity::{self, ActivityProxy};
use crate::bls::BlsEngine;
use crate::fold::{self, DepthMeasurement, FoldedLightCurve, PhaseWindows};
use crate::lightcurve::LightCurve;
use crate::stats;
use crate::types::{
    BlsParams, BootstrapParams, BootstrapSummary, CheckKind, CheckResult, CheckStatus, FapParams,
    FapSummary, OddEvenComparison, TransitCandidate, Verdict, VettingParams, VettingReport,
    VettingStatistics, VettingThresholds,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Earth radii per solar radius.
pub const SOLAR_RADIUS_IN_EARTH_RADII: f64 = 109.08;

/// Radius of Mercury in Earth radii, the smallest plausible planet.
pub const MERCURY_RADIUS_EARTH: f64 = 0.383;

/// Keeps the permutation stream independent of the bootstrap stream.
const FAP_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

// ---------------------------------------------------------------------------
// Vetter
// ---------------------------------------------------------------------------

/// The data a candidate is vetted against.
#[derive(Clone, Copy, Debug)]
pub struct VettingContext<'a> {
    /// The preprocessed light curve the candidate was found in.
    pub light_curve: &'a LightCurve,
    /// Search configuration of the detection; the false-alarm searches cover
    /// the same period range.
    pub search: &'a BlsParams,
    /// Host star radius in solar radii.
    pub stellar_radius: f64,
    pub activity: Option<&'a ActivityProxy>,
}

/// Runs the vetting checks for one candidate at a time.
#[derive(Clone, Debug, Default)]
pub struct Vetter {
    params: VettingParams,
}

impl Vetter {
    pub fn new(params: VettingParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &VettingParams {
        &self.params
    }

    /// Compute every statistic, evaluate the checks and decide.
    pub fn vet(&self, ctx: &VettingContext<'_>, candidate: &TransitCandidate) -> VettingReport {
        let start = Instant::now();
        info!(
            "Vetting candidate {} (P={:.4} d, depth={:.4}%)",
            candidate.rank,
            candidate.period,
            candidate.depth_percent()
        );

        let statistics = self.statistics(ctx, candidate);
        let checks = evaluate(&statistics, &self.params.thresholds);
        let verdict = decide(&checks);

        info!(
            "Candidate {} vetted in {} ms: {}",
            candidate.rank,
            start.elapsed().as_millis(),
            verdict
        );
        VettingReport {
            candidate: candidate.clone(),
            statistics,
            checks,
            verdict,
        }
    }

    /// The summary statistics the verdict is computed from.
    pub fn statistics(&self, ctx: &VettingContext<'_>, candidate: &TransitCandidate) -> VettingStatistics {
        let lc = ctx.light_curve;

        let periods = bootstrap_periods(lc, candidate.period, &self.params.bootstrap, ctx.search, self.params.seed);
        let bootstrap = bootstrap_summary(&periods, candidate.period);
        if let Some(b) = &bootstrap {
            debug!("Bootstrap: P = {:.5} ± {:.5} d, σ(P)/P = {:.2e}", b.mean_period, b.std_period, b.rel_spread);
        }

        let null = null_powers(lc, ctx.search, &self.params.fap, self.params.seed);
        let fap = false_alarm_probability(&null, candidate.power);
        if let Some(f) = &fap {
            debug!("FAP: {}/{} null trials reach power {:.1}", f.exceeding, f.trials, f.observed_power);
        }

        let windows = PhaseWindows::for_transit(candidate.duration, candidate.period);
        let folded = fold::fold(lc, candidate.period, candidate.transit_time).ok();
        let depth = folded.as_ref().and_then(|f| match fold::measure_depth(f, &windows) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Depth of candidate {} not measurable: {}", candidate.rank, e);
                None
            }
        });
        let implied_radius_earth = depth
            .as_ref()
            .and_then(|d| implied_radius_earth(d.depth, ctx.stellar_radius));

        let odd_even = match (&folded, &depth) {
            (Some(f), Some(d)) => compare_odd_even(f, &windows, d, self.params.thresholds.odd_even_min_sigma),
            _ => OddEvenComparison::Inconclusive {
                reason: "transit depth not measurable".to_string(),
            },
        };

        let activity_correlation = ctx
            .activity
            .and_then(|proxy| activity::activity_correlation(lc, proxy));

        VettingStatistics {
            bootstrap,
            fap,
            depth,
            implied_radius_earth,
            odd_even,
            activity_correlation,
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Best period of each bootstrap resample, searched in a narrow window
/// around `period`.  Resamples whose search fails are dropped.
pub fn bootstrap_periods(
    lc: &LightCurve,
    period: f64,
    params: &BootstrapParams,
    search: &BlsParams,
    seed: u64,
) -> Vec<f64> {
    let engine = BlsEngine::new(BlsParams {
        minimum_period: (period - params.period_window).max(period / 2.0),
        maximum_period: period + params.period_window,
        frequency_factor: params.frequency_factor,
        ..search.clone()
    });
    let (time, flux, flux_err) = (lc.time(), lc.flux(), lc.flux_err());
    let n = lc.len();

    let periods: Vec<f64> = (0..params.iterations)
        .into_par_iter()
        .filter_map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
            let idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let t: Array1<f64> = idx.iter().map(|&j| time[j]).collect();
            let f: Array1<f64> = idx.iter().map(|&j| flux[j]).collect();
            let e: Array1<f64> = idx.iter().map(|&j| flux_err[j]).collect();
            match engine.search_arrays(t.view(), f.view(), e.view()) {
                Ok(pg) => pg.best().map(|b| b.period),
                Err(err) => {
                    debug!("Bootstrap resample {} failed: {}", i, err);
                    None
                }
            }
        })
        .collect();

    if periods.len() < params.iterations {
        warn!("{} of {} bootstrap resamples failed", params.iterations - periods.len(), params.iterations);
    }
    periods
}

/// σ(P)/P of the recovered periods (population standard deviation).
pub fn relative_spread(periods: &[f64], period: f64) -> Option<f64> {
    let std = stats::std_dev(periods)?;
    if period > 0.0 {
        Some(std / period)
    } else {
        None
    }
}

pub fn bootstrap_summary(periods: &[f64], period: f64) -> Option<BootstrapSummary> {
    Some(BootstrapSummary {
        iterations: periods.len(),
        mean_period: stats::mean(periods)?,
        std_period: stats::std_dev(periods)?,
        rel_spread: relative_spread(periods, period)?,
    })
}

// ---------------------------------------------------------------------------
// False-alarm probability
// ---------------------------------------------------------------------------

/// Search configuration of the null trials: the detection's period range
/// and, unless overridden, its frequency grid.
pub fn null_search_params(search: &BlsParams, params: &FapParams) -> BlsParams {
    BlsParams {
        frequency_factor: params.frequency_factor.unwrap_or(search.frequency_factor),
        ..search.clone()
    }
}

/// Best BLS power of each timestamp permutation.  Permuting the times keeps
/// the flux distribution but destroys any periodicity.
pub fn null_powers(lc: &LightCurve, search: &BlsParams, params: &FapParams, seed: u64) -> Vec<f64> {
    let engine = BlsEngine::new(null_search_params(search, params));
    let base = seed.wrapping_add(FAP_SEED_OFFSET);
    let time = lc.time().to_vec();
    let (flux, flux_err) = (lc.flux(), lc.flux_err());

    (0..params.trials)
        .into_par_iter()
        .filter_map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(base.wrapping_add(i as u64));
            let mut shuffled = time.clone();
            shuffled.shuffle(&mut rng);
            let t = Array1::from(shuffled);
            match engine.search_arrays(t.view(), flux, flux_err) {
                Ok(pg) => pg.max_power(),
                Err(err) => {
                    debug!("Permutation {} failed: {}", i, err);
                    None
                }
            }
        })
        .collect()
}

/// Fraction of null trials whose best power reaches `observed`.
pub fn false_alarm_probability(null: &[f64], observed: f64) -> Option<FapSummary> {
    if null.is_empty() {
        return None;
    }
    let exceeding = null.iter().filter(|&&p| p >= observed).count();
    Some(FapSummary {
        trials: null.len(),
        exceeding,
        observed_power: observed,
        fap: exceeding as f64 / null.len() as f64,
    })
}

// ---------------------------------------------------------------------------
// Depth and odd/even
// ---------------------------------------------------------------------------

/// Planet radius in Earth radii implied by a fractional depth around a star
/// of `stellar_radius` solar radii.  `None` for a non-positive depth.
pub fn implied_radius_earth(depth: f64, stellar_radius: f64) -> Option<f64> {
    if !(depth.is_finite() && depth > 0.0) {
        return None;
    }
    Some(depth.sqrt() * stellar_radius * SOLAR_RADIUS_IN_EARTH_RADII)
}

/// Compare odd- and even-numbered transits measured with `windows`.
pub fn compare_odd_even(
    folded: &FoldedLightCurve,
    windows: &PhaseWindows,
    full: &DepthMeasurement,
    min_sigma: f64,
) -> OddEvenComparison {
    if full.significance() < min_sigma {
        return OddEvenComparison::Inconclusive {
            reason: format!(
                "transit too shallow ({:.1}σ < {:.1}σ)",
                full.significance(),
                min_sigma
            ),
        };
    }

    let odd = fold::measure_depth(&folded.filter_transits(|n| n.rem_euclid(2) == 1), windows);
    let even = fold::measure_depth(&folded.filter_transits(|n| n.rem_euclid(2) == 0), windows);
    let (odd, even) = match (odd, even) {
        (Ok(o), Ok(e)) => (o, e),
        (Err(e), _) | (_, Err(e)) => {
            return OddEvenComparison::Inconclusive {
                reason: format!("subset not measurable: {e}"),
            }
        }
    };

    let combined = (odd.depth_err.powi(2) + even.depth_err.powi(2)).sqrt();
    if !(combined > 0.0) {
        return OddEvenComparison::Inconclusive {
            reason: "odd/even depths have no scatter estimate".to_string(),
        };
    }

    OddEvenComparison::Measured {
        odd_depth: odd.depth,
        odd_err: odd.depth_err,
        even_depth: even.depth,
        even_err: even.depth_err,
        difference_sigma: (odd.depth - even.depth).abs() / combined,
    }
}

// ---------------------------------------------------------------------------
// Checks and decision
// ---------------------------------------------------------------------------

/// Evaluate the five checks, in [`CheckKind::ALL`] order.
pub fn evaluate(stats: &VettingStatistics, thresholds: &VettingThresholds) -> Vec<CheckResult> {
    vec![
        check_bootstrap(stats, thresholds),
        check_fap(stats, thresholds),
        check_depth(stats, thresholds),
        check_odd_even(stats, thresholds),
        check_activity(stats, thresholds),
    ]
}

fn check_bootstrap(stats: &VettingStatistics, t: &VettingThresholds) -> CheckResult {
    let kind = CheckKind::BootstrapStability;
    match &stats.bootstrap {
        None => CheckResult::new(kind, CheckStatus::Fail, None, "no bootstrap resample could be searched"),
        Some(b) if b.rel_spread < t.max_bootstrap_rel_spread => CheckResult::new(
            kind,
            CheckStatus::Pass,
            Some(b.rel_spread),
            format!("σ(P)/P = {:.2e} < {:.0e}", b.rel_spread, t.max_bootstrap_rel_spread),
        ),
        Some(b) => CheckResult::new(
            kind,
            CheckStatus::Fail,
            Some(b.rel_spread),
            format!("σ(P)/P = {:.2e} ≥ {:.0e}", b.rel_spread, t.max_bootstrap_rel_spread),
        ),
    }
}

fn check_fap(stats: &VettingStatistics, t: &VettingThresholds) -> CheckResult {
    let kind = CheckKind::FalseAlarmProbability;
    match &stats.fap {
        None => CheckResult::new(kind, CheckStatus::Fail, None, "no null trial could be searched"),
        Some(f) if f.fap < t.max_fap => CheckResult::new(
            kind,
            CheckStatus::Pass,
            Some(f.fap),
            format!("FAP = {:.4} ({}/{})", f.fap, f.exceeding, f.trials),
        ),
        Some(f) => CheckResult::new(
            kind,
            CheckStatus::Fail,
            Some(f.fap),
            format!("FAP = {:.4} ({}/{}) ≥ {}", f.fap, f.exceeding, f.trials, t.max_fap),
        ),
    }
}

fn check_depth(stats: &VettingStatistics, t: &VettingThresholds) -> CheckResult {
    let kind = CheckKind::DepthPlausibility;
    match (stats.implied_radius_earth, &stats.depth) {
        (Some(r), _) if r >= t.min_planet_radius_earth => CheckResult::new(
            kind,
            CheckStatus::Pass,
            Some(r),
            format!("implied radius {:.2} R⊕", r),
        ),
        (Some(r), _) => CheckResult::new(
            kind,
            CheckStatus::Fail,
            Some(r),
            format!("implied radius {:.3} R⊕ below {:.3} R⊕", r, t.min_planet_radius_earth),
        ),
        (None, Some(d)) => CheckResult::new(
            kind,
            CheckStatus::Fail,
            Some(d.depth),
            format!("non-positive depth {:.1} ppm", d.depth_ppm()),
        ),
        (None, None) => CheckResult::new(kind, CheckStatus::Fail, None, "depth not measurable"),
    }
}

fn check_odd_even(stats: &VettingStatistics, t: &VettingThresholds) -> CheckResult {
    let kind = CheckKind::OddEvenConsistency;
    match &stats.odd_even {
        OddEvenComparison::Inconclusive { reason } => {
            CheckResult::new(kind, CheckStatus::Inconclusive, None, reason.clone())
        }
        OddEvenComparison::Measured { difference_sigma, .. } => {
            let status = if *difference_sigma > t.max_odd_even_sigma {
                CheckStatus::Fail
            } else {
                CheckStatus::Pass
            };
            CheckResult::new(
                kind,
                status,
                Some(*difference_sigma),
                format!("odd/even differ by {:.1}σ", difference_sigma),
            )
        }
    }
}

fn check_activity(stats: &VettingStatistics, t: &VettingThresholds) -> CheckResult {
    let kind = CheckKind::ActivityCorrelation;
    match stats.activity_correlation {
        None => CheckResult::new(kind, CheckStatus::Inconclusive, None, "no usable activity proxy"),
        Some(r) if r.abs() > t.max_activity_correlation => CheckResult::new(
            kind,
            CheckStatus::Fail,
            Some(r),
            format!("|r| = {:.2} > {}", r.abs(), t.max_activity_correlation),
        ),
        Some(r) => CheckResult::new(kind, CheckStatus::Pass, Some(r), format!("r = {:.2}", r)),
    }
}

/// Combine check results into a verdict.
pub fn decide(checks: &[CheckResult]) -> Verdict {
    let hard: Vec<CheckKind> = checks.iter().filter(|c| c.is_hard_failure()).map(|c| c.kind).collect();
    if !hard.is_empty() {
        return Verdict::Rejected { reasons: hard };
    }

    let failed: Vec<CheckKind> = checks
        .iter()
        .filter(|c| c.status == CheckStatus::Fail)
        .map(|c| c.kind)
        .collect();
    if !failed.is_empty() {
        return Verdict::Rejected { reasons: failed };
    }

    let open: Vec<CheckKind> = checks
        .iter()
        .filter(|c| c.status == CheckStatus::Inconclusive)
        .map(|c| c.kind)
        .collect();
    if !open.is_empty() {
        return Verdict::Inconclusive { reasons: open };
    }

    Verdict::Accepted
}

/// Verdict straight from statistics.
pub fn verdict_for(stats: &VettingStatistics, thresholds: &VettingThresholds) -> Verdict {
    decide(&evaluate(stats, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn passing_stats() -> VettingStatistics {
        VettingStatistics {
            bootstrap: Some(BootstrapSummary {
                iterations: 50,
                mean_period: 7.451,
                std_period: 0.0007,
                rel_spread: 0.0007 / 7.451,
            }),
            fap: Some(FapSummary {
                trials: 1000,
                exceeding: 0,
                observed_power: 892.3,
                fap: 0.0,
            }),
            depth: Some(DepthMeasurement {
                depth: 0.002,
                depth_err: 0.0001,
                n_in: 120,
                n_baseline: 5000,
            }),
            implied_radius_earth: implied_radius_earth(0.002, 0.303),
            odd_even: OddEvenComparison::Measured {
                odd_depth: 0.0021,
                odd_err: 0.00015,
                even_depth: 0.0019,
                even_err: 0.00015,
                difference_sigma: 0.94,
            },
            activity_correlation: Some(0.05),
        }
    }

    #[test]
    fn all_passing_is_accepted() {
        let v = verdict_for(&passing_stats(), &VettingThresholds::default());
        assert_eq!(v, Verdict::Accepted);
    }

    #[test]
    fn sub_mercury_depth_is_rejected() {
        // 0.0004 % around a 0.303 R☉ star.
        let r = implied_radius_earth(4e-6, 0.303).unwrap();
        assert_relative_eq!(r, 0.0661, epsilon = 1e-3);

        let mut s = passing_stats();
        s.depth = Some(DepthMeasurement {
            depth: 4e-6,
            depth_err: 1e-6,
            n_in: 100,
            n_baseline: 5000,
        });
        s.implied_radius_earth = Some(r);
        let v = verdict_for(&s, &VettingThresholds::default());
        assert_eq!(
            v,
            Verdict::Rejected {
                reasons: vec![CheckKind::DepthPlausibility]
            }
        );
        assert_eq!(v.to_string(), "reject: implausible depth");
    }

    #[test]
    fn three_in_a_thousand_is_significant() {
        let mut null = vec![10.0; 1000];
        null[0] = 900.0;
        null[1] = 892.3;
        null[2] = 1000.0;
        let f = false_alarm_probability(&null, 892.3).unwrap();
        assert_eq!(f.exceeding, 3);
        assert_relative_eq!(f.fap, 0.003);

        let mut s = passing_stats();
        s.fap = Some(f);
        let checks = evaluate(&s, &VettingThresholds::default());
        assert_eq!(checks[1].status, CheckStatus::Pass);
    }

    #[test]
    fn hard_failures_short_circuit_soft_ones() {
        let mut s = passing_stats();
        s.bootstrap.as_mut().unwrap().rel_spread = 0.01;
        s.activity_correlation = Some(-0.8);
        let v = verdict_for(&s, &VettingThresholds::default());
        assert_eq!(
            v,
            Verdict::Rejected {
                reasons: vec![CheckKind::ActivityCorrelation]
            }
        );
    }

    #[test]
    fn soft_failure_rejects() {
        let mut s = passing_stats();
        s.bootstrap.as_mut().unwrap().rel_spread = 1e-3;
        let v = verdict_for(&s, &VettingThresholds::default());
        assert_eq!(
            v,
            Verdict::Rejected {
                reasons: vec![CheckKind::BootstrapStability]
            }
        );
    }

    #[test]
    fn shallow_odd_even_is_inconclusive() {
        let mut s = passing_stats();
        s.odd_even = OddEvenComparison::Inconclusive {
            reason: "transit too shallow".to_string(),
        };
        let v = verdict_for(&s, &VettingThresholds::default());
        assert_eq!(
            v,
            Verdict::Inconclusive {
                reasons: vec![CheckKind::OddEvenConsistency]
            }
        );
    }

    #[test]
    fn missing_statistics_fail_their_checks() {
        let mut s = passing_stats();
        s.fap = None;
        s.depth = None;
        s.implied_radius_earth = None;
        let checks = evaluate(&s, &VettingThresholds::default());
        assert_eq!(checks[1].status, CheckStatus::Fail);
        assert_eq!(checks[2].status, CheckStatus::Fail);
        assert_eq!(
            decide(&checks),
            Verdict::Rejected {
                reasons: vec![CheckKind::DepthPlausibility]
            }
        );
    }

    #[test]
    fn non_positive_depth_has_no_radius() {
        assert!(implied_radius_earth(0.0, 1.0).is_none());
        assert!(implied_radius_earth(-1e-4, 1.0).is_none());
        assert!(implied_radius_earth(f64::NAN, 1.0).is_none());
    }

    #[test]
    fn spread_is_population_std_over_period() {
        let periods = [9.9, 10.1];
        assert_relative_eq!(relative_spread(&periods, 10.0).unwrap(), 0.01, epsilon = 1e-12);
        assert!(bootstrap_summary(&[], 10.0).is_none());
    }

    #[test]
    fn checks_come_in_fixed_order() {
        let kinds: Vec<CheckKind> = evaluate(&passing_stats(), &VettingThresholds::default())
            .iter()
            .map(|c| c.kind)
            .collect();
        assert_eq!(kinds, CheckKind::ALL.to_vec());
    }

    #[test]
    fn null_trials_search_the_detection_grid() {
        let search = BlsParams::with_range(1.0, 10.0, 10.0);
        let null = null_search_params(&search, &FapParams::default());
        assert_eq!(null, search);

        let coarse = FapParams {
            trials: 10,
            frequency_factor: Some(500.0),
        };
        let null = null_search_params(&search, &coarse);
        assert_eq!(null.frequency_factor, 500.0);
        assert_eq!((null.minimum_period, null.maximum_period), (1.0, 10.0));
    }

    #[test]
    fn pure_noise_is_not_significant() {
        let lc = crate::synthetic::SyntheticLightCurve {
            cadence_minutes: 30.0,
            noise_ppm: 1000.0,
            seed: 8,
            ..crate::synthetic::SyntheticLightCurve::default()
        }
        .build()
        .unwrap();
        let search = BlsParams::with_range(1.0, 10.0, 10.0);
        let observed = BlsEngine::new(search.clone()).search(&lc).unwrap().max_power().unwrap();

        let params = FapParams {
            trials: 40,
            frequency_factor: None,
        };
        let null = null_powers(&lc, &search, &params, 42);
        assert_eq!(null.len(), 40);
        let f = false_alarm_probability(&null, observed).unwrap();
        assert!(f.fap >= 0.01, "noise reported as significant: {:?}", f);
    }
}
