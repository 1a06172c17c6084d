//! Python entry points (enabled with the `python` feature).

use ndarray::Array1;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::bls::BlsEngine;
use crate::ranker;
use crate::types::{
    BlsParams, BootstrapSummary, FapSummary, OddEvenComparison, RankParams, TransitCandidate,
    VettingStatistics, VettingThresholds,
};
use crate::vetting;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Run a BLS search and return `(periods, power)`.
#[pyfunction]
#[pyo3(signature = (time, flux, flux_err, params=None))]
fn bls_periodogram(
    time: Vec<f64>,
    flux: Vec<f64>,
    flux_err: Vec<f64>,
    params: Option<BlsParams>,
) -> PyResult<(Vec<f64>, Vec<f64>)> {
    let engine = BlsEngine::new(params.unwrap_or_default());
    let (t, f, e) = (Array1::from(time), Array1::from(flux), Array1::from(flux_err));
    let pg = engine.search_arrays(t.view(), f.view(), e.view()).map_err(value_error)?;
    Ok((pg.periods, pg.power))
}

/// Run a BLS search and extract ranked candidates.
#[pyfunction]
#[pyo3(signature = (time, flux, flux_err, params=None, rank=None))]
fn search_candidates(
    time: Vec<f64>,
    flux: Vec<f64>,
    flux_err: Vec<f64>,
    params: Option<BlsParams>,
    rank: Option<RankParams>,
) -> PyResult<Vec<TransitCandidate>> {
    let engine = BlsEngine::new(params.unwrap_or_default());
    let (t, f, e) = (Array1::from(time), Array1::from(flux), Array1::from(flux_err));
    let pg = engine.search_arrays(t.view(), f.view(), e.view()).map_err(value_error)?;
    Ok(ranker::rank_candidates(&pg, &rank.unwrap_or_default()))
}

/// Planet radius in Earth radii implied by a depth around a star of the
/// given radius (solar radii).
#[pyfunction]
fn implied_radius_earth(depth: f64, stellar_radius: f64) -> Option<f64> {
    vetting::implied_radius_earth(depth, stellar_radius)
}

/// Verdict from precomputed statistics, e.g. `"reject: implausible depth"`.
///
/// `None` for a statistic means it could not be computed.
#[pyfunction]
#[pyo3(signature = (period, rel_spread, fap, depth, stellar_radius, odd_even_sigma=None, activity_correlation=None, thresholds=None))]
#[allow(clippy::too_many_arguments)]
fn verdict(
    period: f64,
    rel_spread: Option<f64>,
    fap: Option<f64>,
    depth: f64,
    stellar_radius: f64,
    odd_even_sigma: Option<f64>,
    activity_correlation: Option<f64>,
    thresholds: Option<VettingThresholds>,
) -> String {
    let stats = VettingStatistics {
        bootstrap: rel_spread.map(|s| BootstrapSummary {
            iterations: 0,
            mean_period: period,
            std_period: s * period,
            rel_spread: s,
        }),
        fap: fap.map(|f| FapSummary {
            trials: 0,
            exceeding: 0,
            observed_power: f64::NAN,
            fap: f,
        }),
        depth: None,
        implied_radius_earth: vetting::implied_radius_earth(depth, stellar_radius),
        odd_even: match odd_even_sigma {
            Some(sigma) => OddEvenComparison::Measured {
                odd_depth: f64::NAN,
                odd_err: f64::NAN,
                even_depth: f64::NAN,
                even_err: f64::NAN,
                difference_sigma: sigma,
            },
            None => OddEvenComparison::Inconclusive {
                reason: "not measured".to_string(),
            },
        },
        activity_correlation,
    };
    vetting::verdict_for(&stats, &thresholds.unwrap_or_default()).to_string()
}

/// Register the classes and functions of the `transit_core` module.
pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<TransitCandidate>()?;
    m.add_class::<BlsParams>()?;
    m.add_class::<RankParams>()?;
    m.add_class::<VettingThresholds>()?;
    m.add_function(wrap_pyfunction!(bls_periodogram, m)?)?;
    m.add_function(wrap_pyfunction!(search_candidates, m)?)?;
    m.add_function(wrap_pyfunction!(implied_radius_earth, m)?)?;
    m.add_function(wrap_pyfunction!(verdict, m)?)?;
    Ok(())
}
