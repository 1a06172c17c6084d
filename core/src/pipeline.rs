//! End-to-end analyses of one target.
//!
//! Both analyses share the same front half (load sectors, stitch, clean,
//! detrend, normalise) and differ in what they do with the cleaned light
//! curve:
//!
//! * [`Pipeline::run_habitable_zone`] recovers the known planets with a
//!   full-range search, searches a second period range for new candidates
//!   and vets every candidate.
//! * [`Pipeline::run_trojan`] folds at the known planet's period and looks
//!   for co-orbital companions at L4/L5.

use std::time::Instant;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityError, ActivityProxy, ProxySource};
use crate::archive::{self, ArchiveError, SectorArchive};
use crate::bls::{BlsEngine, BlsError, Periodogram};
use crate::config::{ConfigError, TargetConfig};
use crate::lightcurve::{LightCurve, LightCurveError};
use crate::lomb_scargle;
use crate::preprocess::{PreprocessError, Preprocessed, Preprocessor};
use crate::ranker;
use crate::trojan::{TrojanError, TrojanResult, TrojanSearch};
use crate::types::VettingReport;
use crate::vetting::{Vetter, VettingContext};

/// Rotation period assumed for a synthetic proxy when none was measured.
const FALLBACK_ROTATION_PERIOD: f64 = 10.0;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    LightCurve(#[from] LightCurveError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Bls(#[from] BlsError),

    #[error(transparent)]
    Trojan(#[from] TrojanError),

    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("target {0} has no known planet to search around")]
    NoKnownPlanet(String),
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The light curve before and after cleaning.
#[derive(Clone, Debug)]
pub struct PreparedTarget {
    pub raw: LightCurve,
    pub processed: Preprocessed,
    /// Dominant variability period of the stitched light curve.
    pub rotation_period: Option<f64>,
}

impl PreparedTarget {
    pub fn light_curve(&self) -> &LightCurve {
        &self.processed.light_curve
    }
}

/// One peak of the recovery search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoveredPeriod {
    pub rank: usize,
    pub period: f64,
    pub power: f64,
    /// Name of the known planet this period matches, if any.
    pub known_planet: Option<String>,
}

/// A vetted candidate with its depth label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateAssessment {
    pub report: VettingReport,
    /// Shallower than the configured detectability limit.
    pub too_shallow: bool,
}

/// Serializable outcome of a habitable-zone analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HabitableZoneSummary {
    pub name: String,
    pub target: String,
    pub sectors: Vec<u32>,
    pub n_raw: usize,
    pub n_outliers: usize,
    pub n_samples: usize,
    pub time_range: (f64, f64),
    pub rotation_period: Option<f64>,
    pub candidate_range: (f64, f64),
    pub recovered: Vec<RecoveredPeriod>,
    /// Known planets matched by at least one recovered period.
    pub known_planets_recovered: Vec<String>,
    pub candidates: Vec<CandidateAssessment>,
}

impl HabitableZoneSummary {
    pub fn all_known_recovered(&self, n_known: usize) -> bool {
        self.known_planets_recovered.len() == n_known
    }

    pub fn accepted(&self) -> impl Iterator<Item = &CandidateAssessment> {
        self.candidates.iter().filter(|c| c.report.verdict.is_accepted())
    }
}

/// Habitable-zone analysis with the arrays needed for figures.
#[derive(Clone, Debug)]
pub struct HabitableZoneAnalysis {
    pub summary: HabitableZoneSummary,
    pub light_curve: LightCurve,
    pub recovery_periodogram: Periodogram,
    pub candidate_periodogram: Periodogram,
}

/// Trojan analysis with the light curve needed for figures.
#[derive(Clone, Debug)]
pub struct TrojanAnalysis {
    pub result: TrojanResult,
    pub light_curve: LightCurve,
    pub n_outliers: usize,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs the analyses for one configured target against an archive.
pub struct Pipeline<'a> {
    archive: &'a dyn SectorArchive,
    config: TargetConfig,
    activity: Option<ActivityProxy>,
}

impl<'a> Pipeline<'a> {
    pub fn new(archive: &'a dyn SectorArchive, config: TargetConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            archive,
            config,
            activity: None,
        })
    }

    /// Use `proxy` for the activity check instead of the configured source.
    pub fn with_activity_proxy(mut self, proxy: ActivityProxy) -> Self {
        self.activity = Some(proxy);
        self
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Load, stitch and clean the target's light curve.
    pub fn prepare(&self) -> Result<PreparedTarget, PipelineError> {
        let cfg = &self.config;
        let sectors = self.archive.download_all(&cfg.target)?;
        info!("Downloaded {} light curves for {}", sectors.len(), cfg.target);

        let raw = archive::stitch(&cfg.target, &sectors, cfg.quality_bitmask)?;
        let (start, end) = raw.time_range();
        info!("Combined light curve: {} data points, {:.1} to {:.1} BTJD", raw.len(), start, end);

        let processed = Preprocessor::new(cfg.preprocess.clone()).run(&raw)?;

        let rotation_period = match lomb_scargle::lomb_scargle(&raw, &cfg.lomb_scargle) {
            Ok(pg) => pg.best_period(),
            Err(e) => {
                warn!("Variability period not measured: {}", e);
                None
            }
        };

        Ok(PreparedTarget {
            raw,
            processed,
            rotation_period,
        })
    }

    /// The activity proxy the vetting step correlates against.
    pub fn activity_proxy(&self, prepared: &PreparedTarget) -> Result<Option<ActivityProxy>, PipelineError> {
        if let Some(proxy) = &self.activity {
            return Ok(Some(proxy.clone()));
        }
        let lc = prepared.light_curve();
        let proxy = match self.config.activity_proxy {
            ProxySource::Supplied => {
                warn!("No activity proxy supplied; the activity check will be inconclusive");
                None
            }
            ProxySource::DetrendTrend => Some(ActivityProxy::from_trend(lc, &prepared.processed.trend.to_vec())?),
            ProxySource::Synthetic => Some(ActivityProxy::synthetic(
                &lc.time().to_vec(),
                prepared.rotation_period.unwrap_or(FALLBACK_ROTATION_PERIOD),
                self.config.vetting.seed,
            )?),
        };
        Ok(proxy)
    }

    /// Known-planet recovery, candidate search and vetting.
    pub fn run_habitable_zone(&self) -> Result<HabitableZoneAnalysis, PipelineError> {
        let start = Instant::now();
        let cfg = &self.config;
        let prepared = self.prepare()?;
        let lc = prepared.light_curve();

        // -- known planet recovery -----------------------------------------
        info!(
            "Recovering known planets over {:.1}-{:.1} d",
            cfg.recovery.bls.minimum_period, cfg.recovery.bls.maximum_period
        );
        let recovery_periodogram = BlsEngine::new(cfg.recovery.bls.clone()).search(lc)?;
        let known = cfg.known_periods();
        let recovered: Vec<RecoveredPeriod> = ranker::rank_candidates(&recovery_periodogram, &cfg.recovery.rank)
            .into_iter()
            .map(|c| {
                let known_planet = ranker::match_known_period(c.period, &known, cfg.match_tolerance)
                    .map(|i| cfg.known_planets[i].name.clone());
                RecoveredPeriod {
                    rank: c.rank,
                    period: c.period,
                    power: c.power,
                    known_planet,
                }
            })
            .collect();
        let mut known_planets_recovered: Vec<String> =
            recovered.iter().filter_map(|r| r.known_planet.clone()).collect();
        known_planets_recovered.sort();
        known_planets_recovered.dedup();
        info!(
            "Recovered {} of {} known planets",
            known_planets_recovered.len(),
            cfg.known_planets.len()
        );

        // -- candidate search ----------------------------------------------
        let search = &cfg.candidate_search;
        info!(
            "Searching for candidates over {:.1}-{:.1} d",
            search.bls.minimum_period, search.bls.maximum_period
        );
        let candidate_periodogram = BlsEngine::new(search.bls.clone()).search(lc)?;
        let candidates = ranker::rank_candidates(&candidate_periodogram, &search.rank);

        // -- vetting ---------------------------------------------------------
        let proxy = self.activity_proxy(&prepared)?;
        let vetter = Vetter::new(cfg.vetting.clone());
        let ctx = VettingContext {
            light_curve: lc,
            search: &search.bls,
            stellar_radius: cfg.stellar_radius,
            activity: proxy.as_ref(),
        };
        let candidates: Vec<CandidateAssessment> = candidates
            .iter()
            .map(|c| CandidateAssessment {
                report: vetter.vet(&ctx, c),
                too_shallow: c.depth_percent() < cfg.shallow_depth_percent,
            })
            .collect();

        info!("Analysis of {} finished in {:.1} s", cfg.name, start.elapsed().as_secs_f64());

        let summary = HabitableZoneSummary {
            name: cfg.name.clone(),
            target: cfg.target.clone(),
            sectors: prepared.raw.sectors.clone(),
            n_raw: prepared.raw.len(),
            n_outliers: prepared.processed.n_outliers,
            n_samples: lc.len(),
            time_range: lc.time_range(),
            rotation_period: prepared.rotation_period,
            candidate_range: (search.bls.minimum_period, search.bls.maximum_period),
            recovered,
            known_planets_recovered,
            candidates,
        };
        Ok(HabitableZoneAnalysis {
            summary,
            light_curve: prepared.processed.light_curve,
            recovery_periodogram,
            candidate_periodogram,
        })
    }

    /// L4/L5 search around the first known planet.
    pub fn run_trojan(&self) -> Result<TrojanAnalysis, PipelineError> {
        let planet = self
            .config
            .known_planets
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::NoKnownPlanet(self.config.target.clone()))?;
        info!(
            "Trojan search for {}: P={} d, depth={} ppm",
            planet.name, planet.period, planet.depth_ppm
        );

        let prepared = self.prepare()?;
        let result = TrojanSearch::new(planet, self.config.trojan.clone()).run(prepared.light_curve())?;
        Ok(TrojanAnalysis {
            result,
            light_curve: prepared.processed.light_curve,
            n_outliers: prepared.processed.n_outliers,
        })
    }
}
