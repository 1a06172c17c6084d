//! PNG figures for the two analyses, drawn with plotters.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::bls::Periodogram;
use crate::config::TargetConfig;
use crate::fold::{self, FoldedLightCurve};
use crate::lightcurve::LightCurve;
use crate::pipeline::{HabitableZoneAnalysis, TrojanAnalysis};
use crate::report::ReportError;
use crate::trojan::{LagrangePoint, LagrangePointMeasurement};

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;
type PlotResult = Result<(), Box<dyn std::error::Error>>;

/// Scatter plots are thinned to at most this many points.
const MAX_SCATTER_POINTS: usize = 20_000;

const ORANGE: RGBColor = RGBColor(255, 140, 0);
const PURPLE: RGBColor = RGBColor(128, 0, 128);

/// Figure size in pixels.
#[derive(Clone, Copy, Debug)]
pub struct FigureSize {
    pub width: u32,
    pub height: u32,
}

impl Default for FigureSize {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 1350,
        }
    }
}

fn padded(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 1e-3 * lo.abs().max(1.0) };
    (lo - pad, hi + pad)
}

fn thinned<T: Copy>(points: &[T]) -> Vec<T> {
    let stride = points.len().div_ceil(MAX_SCATTER_POINTS).max(1);
    points.iter().step_by(stride).copied().collect()
}

fn draw_light_curve(area: &Area<'_>, lc: &LightCurve, title: &str) -> PlotResult {
    let points: Vec<(f64, f64)> = lc.time().iter().copied().zip(lc.flux().iter().copied()).collect();
    let points = thinned(&points);
    let (x0, x1) = lc.time_range();
    let (y0, y1) = padded(points.iter().map(|p| p.1));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Time (BTJD)")
        .y_desc("Normalized Flux")
        .y_label_formatter(&|y| format!("{y:.4}"))
        .draw()?;
    chart.draw_series(points.iter().map(|&p| Circle::new(p, 1, BLACK.mix(0.3).filled())))?;
    Ok(())
}

fn draw_periodogram(area: &Area<'_>, pg: &Periodogram, title: &str, markers: &[f64]) -> PlotResult {
    if pg.is_empty() {
        return Ok(());
    }
    let x0 = pg.periods[0];
    let x1 = pg.periods[pg.len() - 1];
    let y1 = pg.max_power().unwrap_or(1.0).max(f64::MIN_POSITIVE) * 1.05;

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, 0.0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Period (days)")
        .y_desc("BLS Power")
        .draw()?;
    chart.draw_series(LineSeries::new(
        pg.periods.iter().copied().zip(pg.power.iter().copied()),
        &BLACK,
    ))?;
    for &p in markers.iter().filter(|&&p| p >= x0 && p <= x1) {
        chart.draw_series(LineSeries::new(vec![(p, 0.0), (p, y1)], RED.mix(0.5).stroke_width(1)))?;
    }
    Ok(())
}

fn draw_folded(
    area: &Area<'_>,
    folded: &FoldedLightCurve,
    range: (f64, f64),
    title: &str,
    color: RGBColor,
    nbins: usize,
) -> PlotResult {
    let points: Vec<(f64, f64)> = folded
        .phase
        .iter()
        .copied()
        .zip(folded.flux.iter().copied())
        .filter(|&(p, _)| p > range.0 && p < range.1)
        .collect();
    let points = thinned(&points);
    let binned = fold::bin_phase(folded, range.0, range.1, nbins);
    let (y0, y1) = padded(binned.iter().map(|b| b.flux).chain(points.iter().map(|p| p.1)));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(range.0..range.1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Phase")
        .y_desc("Normalized Flux")
        .y_label_formatter(&|y| format!("{y:.4}"))
        .draw()?;
    chart.draw_series(points.iter().map(|&p| Circle::new(p, 1, color.mix(0.3).filled())))?;
    chart.draw_series(LineSeries::new(
        vec![(range.0, 1.0), (range.1, 1.0)],
        &BLACK.mix(0.3),
    ))?;
    chart.draw_series(LineSeries::new(
        binned.iter().map(|b| (b.phase, b.flux)),
        BLACK.stroke_width(2),
    ))?;
    Ok(())
}

fn draw_lagrange_comparison(area: &Area<'_>, points: [&LagrangePointMeasurement; 2], sigma: f64) -> PlotResult {
    let limit = sigma * points[0].uncertainty_ppm.max(points[1].uncertainty_ppm);
    let (y0, y1) = padded(
        points
            .iter()
            .flat_map(|m| [m.depth_ppm - m.uncertainty_ppm, m.depth_ppm + m.uncertainty_ppm])
            .chain([-limit, limit]),
    );

    let mut chart = ChartBuilder::on(area)
        .caption("L4/L5 Comparison", ("sans-serif", 22))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..1.5, y0..y1)?;
    chart
        .configure_mesh()
        .x_labels(2)
        .x_label_formatter(&|x| if *x < 0.5 { "L4".to_string() } else { "L5".to_string() })
        .y_desc("Transit Depth (ppm)")
        .draw()?;
    chart.draw_series(std::iter::once(Rectangle::new(
        [(-0.5, -limit), (1.5, limit)],
        GREEN.mix(0.2).filled(),
    )))?;
    chart.draw_series(LineSeries::new(vec![(-0.5, 0.0), (1.5, 0.0)], &BLACK.mix(0.5)))?;
    for (x, m) in points.iter().enumerate() {
        let color = match m.point {
            LagrangePoint::L4 => ORANGE,
            LagrangePoint::L5 => PURPLE,
        };
        let x = x as f64;
        chart.draw_series(std::iter::once(ErrorBar::new_vertical(
            x,
            m.depth_ppm - m.uncertainty_ppm,
            m.depth_ppm,
            m.depth_ppm + m.uncertainty_ppm,
            color.filled(),
            12,
        )))?;
    }
    Ok(())
}

fn draw_transit_times(area: &Area<'_>, times: &[f64]) -> PlotResult {
    let points: Vec<(f64, f64)> = times.iter().enumerate().map(|(n, &t)| (n as f64, t)).collect();
    let (x0, x1) = padded(points.iter().map(|p| p.0));
    let (y0, y1) = padded(points.iter().map(|p| p.1));

    let mut chart = ChartBuilder::on(area)
        .caption("Predicted Transits", ("sans-serif", 22))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("Transit Number")
        .y_desc("Mid-transit (BTJD)")
        .draw()?;
    chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.filled())))?;
    Ok(())
}

fn render_habitable_zone(path: &Path, analysis: &HabitableZoneAnalysis, cfg: &TargetConfig, size: FigureSize) -> PlotResult {
    let root = BitMapBackend::new(path, (size.width, size.height)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((3, 3));
    let lc = &analysis.light_curve;
    let summary = &analysis.summary;

    draw_light_curve(&areas[0], lc, "Full TESS Light Curve")?;
    draw_periodogram(
        &areas[1],
        &analysis.recovery_periodogram,
        "Full Periodogram",
        &cfg.known_periods(),
    )?;
    draw_periodogram(
        &areas[2],
        &analysis.candidate_periodogram,
        &format!(
            "Candidate Periodogram ({:.1}-{:.1} d)",
            summary.candidate_range.0, summary.candidate_range.1
        ),
        &[],
    )?;

    // Known planets are folded on the transit time of the nearest trial period.
    let pg = &analysis.recovery_periodogram;
    for (i, planet) in cfg.known_planets.iter().take(3).enumerate() {
        let nearest = (0..pg.len())
            .filter(|&j| (pg.periods[j] - planet.period).abs() < cfg.match_tolerance)
            .min_by(|&a, &b| {
                let da = (pg.periods[a] - planet.period).abs();
                let db = (pg.periods[b] - planet.period).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
        let epoch = nearest.map_or(planet.epoch_btjd(), |j| pg.transit_time[j]);
        let folded = fold::fold(lc, planet.period, epoch)?;
        draw_folded(
            &areas[3 + i],
            &folded,
            (-0.2, 0.2),
            &format!("{} (P={} d)", planet.name, planet.period),
            RED,
            80,
        )?;
    }

    for (i, c) in summary.candidates.iter().take(3).enumerate() {
        let cand = &c.report.candidate;
        let folded = fold::fold(lc, cand.period, cand.transit_time)?;
        draw_folded(
            &areas[6 + i],
            &folded,
            (-0.2, 0.2),
            &format!(
                "Candidate {} (P={:.2} d, {:.4}%)",
                cand.rank,
                cand.period,
                cand.depth_percent()
            ),
            BLUE,
            80,
        )?;
    }

    root.present()?;
    Ok(())
}

fn render_trojan(path: &Path, analysis: &TrojanAnalysis, size: FigureSize) -> PlotResult {
    let root = BitMapBackend::new(path, (size.width, size.height * 2 / 3)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((2, 3));
    let r = &analysis.result;
    let folded = fold::fold(&analysis.light_curve, r.planet.period, r.planet.epoch_btjd())?;

    draw_light_curve(&areas[0], &analysis.light_curve, "Full TESS Light Curve")?;
    draw_folded(
        &areas[1],
        &folded,
        (-0.15, 0.15),
        &format!("Known Planet (depth {:.0} ppm)", r.planet.depth_ppm),
        RGBColor(128, 128, 128),
        49,
    )?;
    draw_transit_times(&areas[2], &r.transit_times)?;
    for (area, m) in [(&areas[3], &r.l4), (&areas[4], &r.l5)] {
        let centre = m.point.phase();
        let color = match m.point {
            LagrangePoint::L4 => ORANGE,
            LagrangePoint::L5 => PURPLE,
        };
        draw_folded(
            area,
            &folded,
            (centre - 0.1, centre + 0.1),
            &format!("{}: {:.1} ppm ({:.1}σ)", m.point, m.depth_ppm, m.significance_sigma),
            color,
            29,
        )?;
    }
    draw_lagrange_comparison(&areas[5], [&r.l4, &r.l5], r.detection_sigma)?;

    root.present()?;
    Ok(())
}

fn output_path(dir: &Path, file_name: &str) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(file_name))
}

/// Nine-panel overview of a habitable-zone analysis, saved as
/// `dir/<stem>_complete_analysis.png`.
pub fn plot_habitable_zone(
    dir: &Path,
    analysis: &HabitableZoneAnalysis,
    cfg: &TargetConfig,
    size: FigureSize,
) -> Result<PathBuf, ReportError> {
    let path = output_path(dir, &format!("{}_complete_analysis.png", cfg.file_stem()))?;
    render_habitable_zone(&path, analysis, cfg, size).map_err(|e| ReportError::Plot(e.to_string()))?;
    info!("Saved {}", path.display());
    Ok(path)
}

/// Six-panel overview of a Trojan search, saved as
/// `dir/<stem>_trojan_search.png`.
pub fn plot_trojan(
    dir: &Path,
    analysis: &TrojanAnalysis,
    stem: &str,
    size: FigureSize,
) -> Result<PathBuf, ReportError> {
    let path = output_path(dir, &format!("{stem}_trojan_search.png"))?;
    render_trojan(&path, analysis, size).map_err(|e| ReportError::Plot(e.to_string()))?;
    info!("Saved {}", path.display());
    Ok(path)
}
