//! Candidate extraction from a BLS periodogram.
//!
//! Peaks are taken greedily: the highest remaining power becomes the next
//! candidate, then every trial period within the exclusion window around it
//! is discarded so that aliases and the wings of the same peak cannot be
//! picked again.

use log::{debug, info};

use crate::bls::Periodogram;
use crate::stats;
use crate::types::{RankParams, TransitCandidate};

/// Power level a peak must exceed when `noise_sigma` is set.
pub fn noise_floor(pg: &Periodogram, noise_sigma: f64) -> Option<f64> {
    let centre = stats::median(&pg.power)?;
    let spread = stats::mad(&pg.power)?;
    Some(centre + noise_sigma * stats::MAD_TO_SIGMA * spread)
}

/// Extract up to `params.count` candidates, strongest first.
///
/// Returns fewer candidates when the periodogram runs out of periods or,
/// with a noise floor configured, out of significant peaks.
pub fn rank_candidates(pg: &Periodogram, params: &RankParams) -> Vec<TransitCandidate> {
    let floor = params.noise_sigma.and_then(|k| noise_floor(pg, k));
    let mut remaining = pg.clone();
    let mut candidates = Vec::with_capacity(params.count);

    while candidates.len() < params.count {
        let Some(i) = remaining.argmax() else {
            break;
        };
        let power = remaining.power[i];
        if let Some(floor) = floor {
            if power <= floor {
                debug!("Peak at {:.4} d (power {:.1}) is below the noise floor {:.1}", remaining.periods[i], power, floor);
                break;
            }
        }

        let candidate = remaining.candidate_at(i, candidates.len() + 1);
        remaining = remaining.without_window(candidate.period, params.exclusion_window);
        candidates.push(candidate);
    }

    info!(
        "Extracted {} of {} requested candidates (exclusion ±{:.2} d)",
        candidates.len(),
        params.count,
        params.exclusion_window
    );
    candidates
}

/// Index of the literature period closest to `period`, if any lies within
/// `tolerance` days.
pub fn match_known_period(period: f64, known: &[f64], tolerance: f64) -> Option<usize> {
    known
        .iter()
        .enumerate()
        .map(|(i, &k)| (i, (k - period).abs()))
        .filter(|&(_, d)| d <= tolerance)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}
