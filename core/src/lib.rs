//! # transit-core
//!
//! Transit search and candidate vetting for TESS light curves, with optional
//! Python bindings via [PyO3](https://pyo3.rs).
//!
//! ## Overview
//!
//! One target is analysed per run, as a linear pipeline:
//!
//! | Module           | Purpose                                                      |
//! |------------------|--------------------------------------------------------------|
//! | [`archive`]      | Reads per-sector light-curve files and stitches them          |
//! | [`preprocess`]   | Outlier clipping, Savitzky–Golay detrending, normalisation    |
//! | [`bls`]          | Box-Least-Squares period search                               |
//! | [`lomb_scargle`] | Stellar variability period                                    |
//! | [`ranker`]       | Top-N peak extraction with an exclusion window                |
//! | [`fold`]         | Phase folding, binning and box-depth measurement              |
//! | [`vetting`]      | Five statistical checks and the accept/reject decision        |
//! | [`trojan`]       | L4/L5 co-orbital search around a known planet                 |
//! | [`pipeline`]     | Habitable-zone and Trojan analyses end to end                 |
//! | [`report`]       | Console summaries and JSON reports                            |
//! | [`plots`]        | PNG figures                                                   |
//! | [`config`]       | Per-target presets                                            |
//! | [`types`]        | Shared data structures (candidates, params, verdicts)         |
//!
//! ## Example
//!
//! ```no_run
//! use transit_core::archive::LocalArchive;
//! use transit_core::config;
//! use transit_core::pipeline::Pipeline;
//!
//! let archive = LocalArchive::new("data");
//! let pipeline = Pipeline::new(&archive, config::l98_59())?;
//! let analysis = pipeline.run_habitable_zone()?;
//! for c in &analysis.summary.candidates {
//!     println!("{:.4} d: {}", c.report.candidate.period, c.report.verdict);
//! }
//! # Ok::<(), transit_core::pipeline::PipelineError>(())
//! ```

pub mod activity;
pub mod archive;
pub mod bls;
pub mod config;
pub mod fold;
pub mod lightcurve;
pub mod lomb_scargle;
pub mod pipeline;
pub mod plots;
pub mod preprocess;
pub mod ranker;
pub mod report;
pub mod stats;
pub mod synthetic;
pub mod trojan;
pub mod types;
pub mod vetting;

#[cfg(feature = "python")]
mod python;

// Re-export the most commonly used items at crate root for convenience.
pub use bls::{BlsEngine, Periodogram};
pub use lightcurve::LightCurve;
pub use pipeline::{Pipeline, PipelineError};
pub use types::{BlsParams, RankParams, TransitCandidate, Verdict, VettingReport, VettingThresholds};
pub use vetting::Vetter;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The top-level Python module exposed by this crate.
///
/// Registered classes: `TransitCandidate`, `BlsParams`, `RankParams` and
/// `VettingThresholds`.  Functions: `bls_periodogram`, `search_candidates`,
/// `implied_radius_earth` and `verdict`.
#[cfg(feature = "python")]
#[pymodule]
fn transit_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)?;

    // Module-level metadata
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("__doc__", "Transit search and candidate vetting for TESS light curves.")?;

    Ok(())
}
