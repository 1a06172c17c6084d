//! Per-target analysis presets.
//!
//! Each target is analysed with a fixed [`TargetConfig`].  The three
//! built-in presets carry the published parameters of the systems the
//! pipeline was developed on; any other target can be described in a JSON
//! file with the same shape (missing fields take the defaults).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activity::ProxySource;
use crate::archive::DEFAULT_QUALITY_BITMASK;
use crate::lomb_scargle::LombScargleParams;
use crate::preprocess::PreprocessParams;
use crate::trojan::{KnownPlanet, TrojanParams};
use crate::types::{BlsParams, RankParams, VettingParams};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One BLS search followed by candidate ranking.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchStage {
    pub bls: BlsParams,
    pub rank: RankParams,
}

/// Everything needed to analyse one target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Common name, used for output file names and report titles.
    pub name: String,
    /// Catalog identifier the archive is queried with.
    pub target: String,
    /// Host star radius in solar radii.
    pub stellar_radius: f64,
    pub known_planets: Vec<KnownPlanet>,
    pub quality_bitmask: u32,
    pub preprocess: PreprocessParams,
    pub lomb_scargle: LombScargleParams,
    /// Full-range search used to recover the known planets.
    pub recovery: SearchStage,
    /// Recovered periods within this many days of a literature period are
    /// labelled with that planet.
    pub match_tolerance: f64,
    /// Search for new candidates; every candidate it yields is vetted.
    pub candidate_search: SearchStage,
    /// Candidates shallower than this (in percent) are labelled too shallow.
    pub shallow_depth_percent: f64,
    /// Proxy for the activity check when none is supplied explicitly.
    pub activity_proxy: ProxySource,
    pub vetting: VettingParams,
    pub trojan: TrojanParams,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            target: String::new(),
            stellar_radius: 1.0,
            known_planets: Vec::new(),
            quality_bitmask: DEFAULT_QUALITY_BITMASK,
            preprocess: PreprocessParams::default(),
            lomb_scargle: LombScargleParams::default(),
            recovery: SearchStage::default(),
            match_tolerance: 0.1,
            candidate_search: SearchStage::default(),
            shallow_depth_percent: 0.01,
            activity_proxy: ProxySource::DetrendTrend,
            vetting: VettingParams::default(),
            trojan: TrojanParams::default(),
        }
    }
}

impl TargetConfig {
    /// Load and validate a JSON preset.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::Invalid("target is empty".into()));
        }
        if !(self.stellar_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "stellar radius must be positive, got {}",
                self.stellar_radius
            )));
        }
        for (label, stage) in [("recovery", &self.recovery), ("candidate_search", &self.candidate_search)] {
            let b = &stage.bls;
            if !(b.minimum_period > 0.0 && b.maximum_period > b.minimum_period) {
                return Err(ConfigError::Invalid(format!(
                    "{label}: period range {}..{} is empty",
                    b.minimum_period, b.maximum_period
                )));
            }
            if !(b.frequency_factor > 0.0) {
                return Err(ConfigError::Invalid(format!("{label}: frequency_factor must be positive")));
            }
        }
        if let Some(p) = self.known_planets.iter().find(|p| !(p.period > 0.0)) {
            return Err(ConfigError::Invalid(format!("planet {} has period {}", p.name, p.period)));
        }
        Ok(())
    }

    /// Literature periods of the known planets.
    pub fn known_periods(&self) -> Vec<f64> {
        self.known_planets.iter().map(|p| p.period).collect()
    }

    /// File-name friendly form of [`TargetConfig::name`].
    pub fn file_stem(&self) -> String {
        let source = if self.name.is_empty() { &self.target } else { &self.name };
        source
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// L 98-59: three known small planets around an M dwarf; the candidate
/// search covers the optimistic habitable zone (5.5–25 d).
pub fn l98_59() -> TargetConfig {
    let planet = |name: &str, period: f64| KnownPlanet {
        name: name.to_string(),
        period,
        epoch: 0.0,
        depth_ppm: 0.0,
    };
    TargetConfig {
        name: "L98-59".to_string(),
        target: "TIC 307210830".to_string(),
        stellar_radius: 0.303,
        known_planets: vec![
            planet("L 98-59 b", 2.253),
            planet("L 98-59 c", 3.690),
            planet("L 98-59 d", 7.451),
        ],
        recovery: SearchStage {
            bls: BlsParams::with_range(0.5, 30.0, 500.0),
            rank: RankParams {
                count: 5,
                exclusion_window: 0.1,
                noise_sigma: None,
            },
        },
        candidate_search: SearchStage {
            bls: BlsParams::with_range(5.5, 25.0, 500.0),
            rank: RankParams {
                count: 3,
                exclusion_window: 1.0,
                noise_sigma: None,
            },
        },
        ..TargetConfig::default()
    }
}

/// HAT-P-7 b, a hot Jupiter on a 2.2 d orbit.
pub fn hat_p_7() -> TargetConfig {
    TargetConfig {
        name: "HAT-P-7".to_string(),
        target: "TIC 424865156".to_string(),
        stellar_radius: 1.84,
        known_planets: vec![KnownPlanet {
            name: "HAT-P-7 b".to_string(),
            period: 2.204730,
            epoch: 2_454_954.357,
            depth_ppm: 700.0,
        }],
        ..TargetConfig::default()
    }
}

/// TOI-2109 b, an ultra-hot Jupiter on a 16 h orbit.
pub fn toi_2109() -> TargetConfig {
    TargetConfig {
        name: "TOI-2109".to_string(),
        target: "TIC 392476080".to_string(),
        stellar_radius: 1.70,
        known_planets: vec![KnownPlanet {
            name: "TOI-2109 b".to_string(),
            period: 0.67246,
            epoch: 2_458_679.0,
            depth_ppm: 18_000.0,
        }],
        ..TargetConfig::default()
    }
}
