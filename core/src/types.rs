//! Common types shared across the transit search and vetting pipeline.
//!
//! These structures represent the data objects passed between stages:
//! search configuration, ranked transit candidates, vetting thresholds, the
//! per-check results and the final verdict for each candidate.

#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

use crate::fold::DepthMeasurement;

// ---------------------------------------------------------------------------
// TransitCandidate
// ---------------------------------------------------------------------------

/// A periodic dip extracted from a BLS periodogram by the ranker.
///
/// The record is transient: it exists for the duration of one analysis run
/// and carries the best-fit box parameters at its period.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitCandidate {
    /// 1-based rank in order of extraction (highest power first).
    pub rank: usize,

    /// Orbital period in days.
    pub period: f64,

    /// BLS log-likelihood power at this period.
    pub power: f64,

    /// Fractional transit depth (0.01 = 1 %).
    pub depth: f64,

    /// Uncertainty of `depth`.
    pub depth_err: f64,

    /// Best-fit transit duration in days.
    pub duration: f64,

    /// Mid-transit time of a reference transit, in BTJD.
    pub transit_time: f64,
}

impl TransitCandidate {
    /// Depth divided by its uncertainty.
    pub fn snr(&self) -> f64 {
        if self.depth_err > 0.0 {
            self.depth / self.depth_err
        } else {
            0.0
        }
    }

    pub fn depth_percent(&self) -> f64 {
        self.depth * 100.0
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration * 24.0
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl TransitCandidate {
    #[new]
    #[pyo3(signature = (rank, period, power, depth, depth_err, duration, transit_time))]
    pub fn py_new(
        rank: usize,
        period: f64,
        power: f64,
        depth: f64,
        depth_err: f64,
        duration: f64,
        transit_time: f64,
    ) -> Self {
        Self {
            rank,
            period,
            power,
            depth,
            depth_err,
            duration,
            transit_time,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "TransitCandidate(rank={}, period={:.4} d, power={:.1}, depth={:.4}%, duration={:.2} h)",
            self.rank,
            self.period,
            self.power,
            self.depth_percent(),
            self.duration_hours(),
        )
    }
}

// ---------------------------------------------------------------------------
// BlsParams
// ---------------------------------------------------------------------------

/// Trial transit durations in days, the set lightkurve searches by default.
pub const DEFAULT_DURATIONS: [f64; 6] = [0.05, 0.10, 0.15, 0.20, 0.25, 0.33];

/// Configuration for a Box-Least-Squares period search.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlsParams {
    /// Shortest trial period in days.
    pub minimum_period: f64,

    /// Longest trial period in days.
    pub maximum_period: f64,

    /// Frequency-grid coarseness.  The frequency step is
    /// `frequency_factor * min(duration) / baseline²`, so larger values give
    /// fewer trial periods.
    pub frequency_factor: f64,

    /// Trial transit durations in days.  Durations not shorter than
    /// `minimum_period` are ignored.
    pub durations: Vec<f64>,

    /// Phase bins per shortest duration.
    pub oversample: usize,

    /// Number of rayon worker threads.  0 uses all available cores.
    pub n_workers: usize,
}

impl Default for BlsParams {
    fn default() -> Self {
        Self {
            minimum_period: 0.5,
            maximum_period: 30.0,
            frequency_factor: 10.0,
            durations: DEFAULT_DURATIONS.to_vec(),
            oversample: 10,
            n_workers: 0,
        }
    }
}

impl BlsParams {
    pub fn with_range(minimum_period: f64, maximum_period: f64, frequency_factor: f64) -> Self {
        Self {
            minimum_period,
            maximum_period,
            frequency_factor,
            ..Self::default()
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl BlsParams {
    #[new]
    #[pyo3(signature = (minimum_period=0.5, maximum_period=30.0, frequency_factor=10.0))]
    pub fn py_new(minimum_period: f64, maximum_period: f64, frequency_factor: f64) -> Self {
        Self::with_range(minimum_period, maximum_period, frequency_factor)
    }

    fn __repr__(&self) -> String {
        format!(
            "BlsParams(period={:.3}-{:.3} d, frequency_factor={:.1}, durations={})",
            self.minimum_period,
            self.maximum_period,
            self.frequency_factor,
            self.durations.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// RankParams
// ---------------------------------------------------------------------------

/// Configuration for iterative peak extraction.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankParams {
    /// Maximum number of candidates to return.
    pub count: usize,

    /// Periods within ± this many days of an extracted peak are removed
    /// before the next extraction.
    pub exclusion_window: f64,

    /// When set, a peak must exceed `median + noise_sigma · 1.4826 · MAD` of
    /// the periodogram power to be extracted.
    pub noise_sigma: Option<f64>,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            count: 3,
            exclusion_window: 1.0,
            noise_sigma: None,
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl RankParams {
    #[new]
    #[pyo3(signature = (count=3, exclusion_window=1.0, noise_sigma=None))]
    pub fn py_new(count: usize, exclusion_window: f64, noise_sigma: Option<f64>) -> Self {
        Self {
            count,
            exclusion_window,
            noise_sigma,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "RankParams(count={}, exclusion=±{:.2} d, noise_sigma={:?})",
            self.count, self.exclusion_window, self.noise_sigma,
        )
    }
}

// ---------------------------------------------------------------------------
// Vetting configuration
// ---------------------------------------------------------------------------

/// Acceptance thresholds for the five vetting checks.
#[cfg_attr(feature = "python", pyclass(get_all, set_all))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VettingThresholds {
    /// Bootstrap σ(P)/P must be strictly below this to count as stable.
    pub max_bootstrap_rel_spread: f64,

    /// FAP must be strictly below this to count as significant.
    pub max_fap: f64,

    /// Smallest plausible planet radius, in Earth radii (Mercury).
    pub min_planet_radius_earth: f64,

    /// Largest tolerated odd/even depth difference, in combined σ.
    pub max_odd_even_sigma: f64,

    /// Full-curve depth significance below which odd/even is inconclusive.
    pub odd_even_min_sigma: f64,

    /// Largest tolerated |Pearson r| against the activity proxy.
    pub max_activity_correlation: f64,
}

impl Default for VettingThresholds {
    fn default() -> Self {
        Self {
            max_bootstrap_rel_spread: 1e-3,
            max_fap: 0.01,
            min_planet_radius_earth: 0.383,
            max_odd_even_sigma: 3.0,
            odd_even_min_sigma: 2.0,
            max_activity_correlation: 0.3,
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl VettingThresholds {
    #[new]
    pub fn py_new() -> Self {
        Self::default()
    }

    fn __repr__(&self) -> String {
        format!(
            "VettingThresholds(spread<{:e}, fap<{}, radius>={} R_earth, odd/even<={}σ, |r|<={})",
            self.max_bootstrap_rel_spread,
            self.max_fap,
            self.min_planet_radius_earth,
            self.max_odd_even_sigma,
            self.max_activity_correlation,
        )
    }
}

/// Bootstrap period-stability settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapParams {
    /// Number of resamples.
    pub iterations: usize,

    /// Half-width in days of the period window searched around the
    /// candidate.
    pub period_window: f64,

    /// Frequency factor of the narrow re-search.
    pub frequency_factor: f64,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            iterations: 50,
            period_window: 0.5,
            frequency_factor: 100.0,
        }
    }
}

/// False-alarm-probability settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FapParams {
    /// Number of timestamp permutations.
    pub trials: usize,

    /// Frequency factor of each null search.  `None` searches the
    /// detection's own grid, so null and observed maxima are comparable.
    pub frequency_factor: Option<f64>,
}

impl Default for FapParams {
    fn default() -> Self {
        Self {
            trials: 1000,
            frequency_factor: None,
        }
    }
}

/// Everything the vetting procedure needs besides the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VettingParams {
    pub bootstrap: BootstrapParams,
    pub fap: FapParams,
    pub thresholds: VettingThresholds,
    /// Base seed for every random draw made while vetting.
    pub seed: u64,
}

impl Default for VettingParams {
    fn default() -> Self {
        Self {
            bootstrap: BootstrapParams::default(),
            fap: FapParams::default(),
            thresholds: VettingThresholds::default(),
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Check results and verdicts
// ---------------------------------------------------------------------------

/// The five vetting checks, in the order they are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    BootstrapStability,
    FalseAlarmProbability,
    DepthPlausibility,
    OddEvenConsistency,
    ActivityCorrelation,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::BootstrapStability,
        CheckKind::FalseAlarmProbability,
        CheckKind::DepthPlausibility,
        CheckKind::OddEvenConsistency,
        CheckKind::ActivityCorrelation,
    ];

    /// Whether a failure of this check rejects a candidate on its own,
    /// regardless of the statistical checks.
    pub fn severity(self) -> Severity {
        match self {
            CheckKind::BootstrapStability | CheckKind::FalseAlarmProbability => Severity::Soft,
            CheckKind::DepthPlausibility
            | CheckKind::OddEvenConsistency
            | CheckKind::ActivityCorrelation => Severity::Hard,
        }
    }

    /// Short phrase used when this check causes a rejection.
    pub fn rejection_label(self) -> &'static str {
        match self {
            CheckKind::BootstrapStability => "unstable period",
            CheckKind::FalseAlarmProbability => "not significant",
            CheckKind::DepthPlausibility => "implausible depth",
            CheckKind::OddEvenConsistency => "odd/even asymmetry",
            CheckKind::ActivityCorrelation => "tracks stellar activity",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CheckKind::BootstrapStability => "bootstrap stability",
            CheckKind::FalseAlarmProbability => "false-alarm probability",
            CheckKind::DepthPlausibility => "depth plausibility",
            CheckKind::OddEvenConsistency => "odd/even consistency",
            CheckKind::ActivityCorrelation => "activity correlation",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Soft,
    Hard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Inconclusive,
}

/// Outcome of a single vetting check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub status: CheckStatus,
    pub severity: Severity,
    /// The scalar the check compared against its threshold, when one exists.
    pub value: Option<f64>,
    pub detail: String,
}

impl CheckResult {
    pub fn new(kind: CheckKind, status: CheckStatus, value: Option<f64>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            severity: kind.severity(),
            value,
            detail: detail.into(),
        }
    }

    pub fn is_hard_failure(&self) -> bool {
        self.status == CheckStatus::Fail && self.severity == Severity::Hard
    }
}

/// Final accept/reject decision for one candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected { reasons: Vec<CheckKind> },
    Inconclusive { reasons: Vec<CheckKind> },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Rejected { .. })
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, Verdict::Inconclusive { .. })
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accepted => f.write_str("accept"),
            Verdict::Rejected { reasons } => {
                let labels: Vec<&str> = reasons.iter().map(|r| r.rejection_label()).collect();
                write!(f, "reject: {}", labels.join(", "))
            }
            Verdict::Inconclusive { reasons } => {
                let labels: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
                write!(f, "inconclusive: {}", labels.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Vetting statistics
// ---------------------------------------------------------------------------

/// Spread of periods recovered from bootstrap resamples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub iterations: usize,
    pub mean_period: f64,
    pub std_period: f64,
    /// σ(P) / P of the candidate.
    pub rel_spread: f64,
}

/// Null distribution of best BLS power under timestamp permutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FapSummary {
    pub trials: usize,
    pub exceeding: usize,
    pub observed_power: f64,
    pub fap: f64,
}

/// Result of comparing odd- and even-numbered transits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OddEvenComparison {
    Measured {
        odd_depth: f64,
        odd_err: f64,
        even_depth: f64,
        even_err: f64,
        /// |odd − even| / sqrt(σ_odd² + σ_even²).
        difference_sigma: f64,
    },
    Inconclusive {
        reason: String,
    },
}

/// The summary statistics the verdict is a pure function of.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VettingStatistics {
    pub bootstrap: Option<BootstrapSummary>,
    pub fap: Option<FapSummary>,
    pub depth: Option<DepthMeasurement>,
    pub implied_radius_earth: Option<f64>,
    pub odd_even: OddEvenComparison,
    pub activity_correlation: Option<f64>,
}

/// Everything produced by vetting one candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VettingReport {
    pub candidate: TransitCandidate,
    pub statistics: VettingStatistics,
    pub checks: Vec<CheckResult>,
    pub verdict: Verdict,
}

impl VettingReport {
    /// Serialise the report to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_and_soft_checks() {
        assert_eq!(CheckKind::BootstrapStability.severity(), Severity::Soft);
        assert_eq!(CheckKind::FalseAlarmProbability.severity(), Severity::Soft);
        assert_eq!(CheckKind::DepthPlausibility.severity(), Severity::Hard);
        assert_eq!(CheckKind::OddEvenConsistency.severity(), Severity::Hard);
        assert_eq!(CheckKind::ActivityCorrelation.severity(), Severity::Hard);
    }

    #[test]
    fn verdict_display() {
        let v = Verdict::Rejected {
            reasons: vec![CheckKind::DepthPlausibility],
        };
        assert_eq!(v.to_string(), "reject: implausible depth");
        assert_eq!(Verdict::Accepted.to_string(), "accept");
        let i = Verdict::Inconclusive {
            reasons: vec![CheckKind::OddEvenConsistency],
        };
        assert_eq!(i.to_string(), "inconclusive: odd/even consistency");
    }

    #[test]
    fn verdict_serialises_with_tag() {
        let v = Verdict::Rejected {
            reasons: vec![CheckKind::ActivityCorrelation],
        };
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"verdict":"rejected","reasons":["activity_correlation"]}"#);
    }

    #[test]
    fn candidate_unit_helpers() {
        let c = TransitCandidate {
            rank: 1,
            period: 7.451,
            power: 892.3,
            depth: 0.002,
            depth_err: 0.0005,
            duration: 0.05,
            transit_time: 1385.2,
        };
        assert!((c.snr() - 4.0).abs() < 1e-12);
        assert!((c.depth_percent() - 0.2).abs() < 1e-12);
        assert!((c.duration_hours() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let t = VettingThresholds::default();
        assert_eq!(t.max_bootstrap_rel_spread, 1e-3);
        assert_eq!(t.max_fap, 0.01);
        assert_eq!(t.max_activity_correlation, 0.3);
        let b = BootstrapParams::default();
        assert_eq!(b.iterations, 50);
        assert_eq!(FapParams::default().trials, 1000);
    }
}
