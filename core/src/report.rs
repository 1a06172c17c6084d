//! Text and JSON reports.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::config::TargetConfig;
use crate::pipeline::{HabitableZoneSummary, TrojanAnalysis};
use crate::types::{CheckStatus, OddEvenComparison, VettingReport};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialise report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to draw figure: {0}")]
    Plot(String),
}

const RULE: &str = "======================================================================";

/// Serialise `value` as pretty JSON to `dir/<stem>_report.json`.
pub fn write_json<T: Serialize>(dir: &Path, stem: &str, value: &T) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stem}_report.json"));
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    info!("Saved {}", path.display());
    Ok(path)
}

fn status_mark(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Inconclusive => "----",
    }
}

/// Multi-line description of one vetting report.
pub fn format_vetting(report: &VettingReport) -> String {
    let c = &report.candidate;
    let mut out = String::new();
    let _ = writeln!(out, "  Candidate {}:", c.rank);
    let _ = writeln!(out, "    Period:   {:.4} days", c.period);
    let _ = writeln!(out, "    Power:    {:.1}", c.power);
    let _ = writeln!(out, "    Depth:    {:.4}% (S/N {:.1})", c.depth_percent(), c.snr());
    let _ = writeln!(out, "    Duration: {:.2} hours", c.duration_hours());

    let s = &report.statistics;
    if let Some(b) = &s.bootstrap {
        let _ = writeln!(
            out,
            "    Bootstrap: {:.4} ± {:.4} days, σ(P)/P = {:.6}",
            b.mean_period, b.std_period, b.rel_spread
        );
    }
    if let Some(r) = s.implied_radius_earth {
        let _ = writeln!(out, "    Implied radius: {:.3} R⊕", r);
    }
    if let OddEvenComparison::Measured {
        odd_depth,
        even_depth,
        ..
    } = &s.odd_even
    {
        let _ = writeln!(
            out,
            "    Odd/even depth: {:.1} / {:.1} ppm",
            odd_depth * 1e6,
            even_depth * 1e6
        );
    }
    for check in &report.checks {
        let _ = writeln!(out, "    [{}] {}: {}", status_mark(check.status), check.kind, check.detail);
    }
    let _ = writeln!(out, "    Verdict: {}", report.verdict);
    out
}

/// Summary of a habitable-zone analysis in the layout of a console report.
pub fn format_habitable_zone(summary: &HabitableZoneSummary, cfg: &TargetConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{} HABITABLE ZONE SEARCH ({})", summary.name.to_uppercase(), summary.target);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Data: {} points after cleaning ({} outliers removed), sectors {:?}",
        summary.n_samples, summary.n_outliers, summary.sectors
    );
    let _ = writeln!(
        out,
        "Time span: {:.1} to {:.1} BTJD",
        summary.time_range.0, summary.time_range.1
    );
    if let Some(p) = summary.rotation_period {
        let _ = writeln!(out, "Dominant variability period: {:.2} days", p);
    }

    let _ = writeln!(out, "\nTOP DETECTED PERIODS:");
    for r in &summary.recovered {
        let label = r
            .known_planet
            .as_ref()
            .map(|name| format!(" <- {name}"))
            .unwrap_or_default();
        let _ = writeln!(out, "  {}. Period: {:.4} days, Power: {:.1}{}", r.rank, r.period, r.power, label);
    }

    let _ = writeln!(out, "\nKNOWN PLANETS:");
    for planet in &cfg.known_planets {
        let found = summary.known_planets_recovered.contains(&planet.name);
        let _ = writeln!(
            out,
            "  {}: {} days {}",
            planet.name,
            planet.period,
            if found { "recovered" } else { "NOT recovered" }
        );
    }

    let _ = writeln!(
        out,
        "\nCANDIDATES ({:.1}-{:.1} days):",
        summary.candidate_range.0, summary.candidate_range.1
    );
    if summary.candidates.is_empty() {
        let _ = writeln!(out, "  none");
    }
    for c in &summary.candidates {
        out.push_str(&format_vetting(&c.report));
        let _ = writeln!(
            out,
            "    Depth class: {}",
            if c.too_shallow { "TOO SHALLOW" } else { "DETECTABLE" }
        );
    }

    let accepted = summary.accepted().count();
    let _ = writeln!(out, "\n{RULE}");
    if accepted == 0 {
        let _ = writeln!(out, "Conclusion: no confirmed candidates");
    } else {
        let _ = writeln!(out, "Conclusion: {} candidate(s) accepted", accepted);
    }
    let _ = writeln!(out, "{RULE}");
    out
}

/// Summary of a Trojan search.
pub fn format_trojan(analysis: &TrojanAnalysis) -> String {
    let r = &analysis.result;
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "TROJAN EXOPLANET SEARCH: {} ({})", r.planet.name, r.target);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Period: {} days, literature depth: {} ppm", r.planet.period, r.planet.depth_ppm);
    let _ = writeln!(
        out,
        "Data: {} points ({} outliers removed)",
        analysis.light_curve.len(),
        analysis.n_outliers
    );
    let v = &r.validation;
    let _ = writeln!(
        out,
        "Known planet: expected {:.1} ppm, measured {:.1} ppm ({})",
        v.expected_depth_ppm,
        v.measured_depth_ppm,
        if v.matches { "match" } else { "MISMATCH" }
    );
    for m in [&r.l4, &r.l5] {
        let _ = writeln!(
            out,
            "{}: {:.1} ± {:.1} ppm, {:.2}σ, {} points",
            m.point, m.depth_ppm, m.uncertainty_ppm, m.significance_sigma, m.n_points
        );
    }
    let detections = r.detections();
    if detections.is_empty() {
        let _ = writeln!(out, "No significant Trojan detection");
        if let Some(limit) = r.upper_limit_ppm {
            let _ = writeln!(out, "Upper limit: ~{:.0} ppm ({}σ)", limit, r.detection_sigma);
        }
    } else {
        for p in detections {
            let _ = writeln!(out, "POTENTIAL DETECTION AT {}", p);
        }
    }
    let _ = writeln!(out, "Transits in data: {}", r.transit_times.len());
    let _ = writeln!(out, "{RULE}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::DepthMeasurement;
    use crate::types::{CheckKind, CheckResult, TransitCandidate, Verdict, VettingStatistics};

    fn report() -> VettingReport {
        VettingReport {
            candidate: TransitCandidate {
                rank: 1,
                period: 12.796,
                power: 31.4,
                depth: 4e-6,
                depth_err: 2e-6,
                duration: 0.05,
                transit_time: 1386.0,
            },
            statistics: VettingStatistics {
                bootstrap: None,
                fap: None,
                depth: Some(DepthMeasurement {
                    depth: 4e-6,
                    depth_err: 2e-6,
                    n_in: 40,
                    n_baseline: 4000,
                }),
                implied_radius_earth: Some(0.066),
                odd_even: OddEvenComparison::Inconclusive {
                    reason: "too shallow".into(),
                },
                activity_correlation: None,
            },
            checks: vec![CheckResult::new(
                CheckKind::DepthPlausibility,
                CheckStatus::Fail,
                Some(0.066),
                "implied radius 0.066 R⊕ below 0.383 R⊕",
            )],
            verdict: Verdict::Rejected {
                reasons: vec![CheckKind::DepthPlausibility],
            },
        }
    }

    #[test]
    fn vetting_text_lists_checks_and_verdict() {
        let text = format_vetting(&report());
        assert!(text.contains("Period:   12.7960 days"));
        assert!(text.contains("[FAIL] depth plausibility"));
        assert!(text.contains("Verdict: reject: implausible depth"));
    }

    #[test]
    fn json_report_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(dir.path(), "test", &report()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["verdict"]["verdict"], "rejected");
        assert_eq!(value["candidate"]["period"], 12.796);
    }
}
