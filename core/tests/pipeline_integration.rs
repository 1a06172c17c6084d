//! End-to-end runs of the habitable-zone and Trojan analyses on synthetic
//! sectors served from memory and from a directory of CSV files.

use std::fs;
use std::io::Write;

use transit_core::activity::ProxySource;
use transit_core::archive::{LocalArchive, MemoryArchive, SectorArchive};
use transit_core::config::{SearchStage, TargetConfig};
use transit_core::pipeline::{Pipeline, PipelineError};
use transit_core::report;
use transit_core::synthetic::{InjectedTransit, SyntheticLightCurve, Variability};
use transit_core::trojan::KnownPlanet;
use transit_core::types::{BlsParams, CheckKind, CheckStatus, RankParams};

const TARGET: &str = "TIC 1000001";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn planet(period: f64, epoch: f64, depth_ppm: f64) -> KnownPlanet {
    KnownPlanet {
        name: format!("synthetic {period}"),
        period,
        epoch,
        depth_ppm,
    }
}

/// Small, fast configuration: coarse grids and few random trials.
fn config(known: Vec<KnownPlanet>) -> TargetConfig {
    let mut cfg = TargetConfig {
        name: "Synthetic-1".to_string(),
        target: TARGET.to_string(),
        stellar_radius: 0.5,
        known_planets: known,
        recovery: SearchStage {
            bls: BlsParams::with_range(1.0, 12.0, 50.0),
            rank: RankParams {
                count: 3,
                exclusion_window: 0.1,
                noise_sigma: None,
            },
        },
        candidate_search: SearchStage {
            bls: BlsParams::with_range(3.0, 8.0, 50.0),
            rank: RankParams {
                count: 2,
                exclusion_window: 1.0,
                noise_sigma: None,
            },
        },
        ..TargetConfig::default()
    };
    cfg.vetting.bootstrap.iterations = 5;
    // Fine enough that the narrow re-search resolves the peak on 54 d of data.
    cfg.vetting.bootstrap.frequency_factor = 5.0;
    cfg.vetting.fap.trials = 20;
    cfg.vetting.seed = 3;
    cfg
}

fn recipe(transits: Vec<InjectedTransit>) -> SyntheticLightCurve {
    SyntheticLightCurve {
        target: TARGET.to_string(),
        baseline_days: 54.0,
        cadence_minutes: 10.0,
        noise_ppm: 300.0,
        transits,
        variability: Some(Variability {
            amplitude: 0.002,
            period: 9.3,
            phase: 0.4,
        }),
        flux_level: 2000.0,
        first_sector: 45,
        seed: 17,
        ..SyntheticLightCurve::default()
    }
}

fn archive(recipe: &SyntheticLightCurve) -> MemoryArchive {
    let mut archive = MemoryArchive::new();
    archive.insert(TARGET, recipe.sectors());
    archive
}

#[test]
fn recovers_injected_planet_and_vets_it() {
    init_logging();
    let transit = InjectedTransit::new(4.3, 1326.1, 0.002, 0.12);
    let archive = archive(&recipe(vec![transit]));
    let cfg = config(vec![planet(4.3, 1326.1, 2000.0)]);

    let analysis = Pipeline::new(&archive, cfg.clone()).unwrap().run_habitable_zone().unwrap();
    let summary = &analysis.summary;

    assert_eq!(summary.sectors, vec![45, 46]);
    assert!(summary.all_known_recovered(1), "recovered: {:?}", summary.recovered);
    assert_eq!(summary.candidate_range, (3.0, 8.0));

    let best = &summary.candidates[0].report;
    assert!((best.candidate.period - 4.3).abs() < 0.05, "best period {}", best.candidate.period);
    assert!(!summary.candidates[0].too_shallow);

    // Every report carries all five checks in order.
    let kinds: Vec<CheckKind> = best.checks.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, CheckKind::ALL.to_vec());
    let bootstrap = &best.checks[0];
    assert_eq!(bootstrap.kind, CheckKind::BootstrapStability);
    assert_eq!(bootstrap.status, CheckStatus::Pass, "{}", bootstrap.detail);
    let b = best.statistics.bootstrap.as_ref().unwrap();
    assert_eq!(b.iterations, 5);
    assert!((b.mean_period - 4.3).abs() < 0.05);

    let fap = &best.checks[1];
    assert_eq!(fap.status, CheckStatus::Pass, "{}", fap.detail);
    assert_eq!(best.statistics.fap.as_ref().unwrap().trials, 20);

    let depth = &best.checks[2];
    assert_eq!(depth.status, CheckStatus::Pass);
    assert!(depth.value.unwrap() > 1.0);

    let text = report::format_habitable_zone(summary, &cfg);
    assert!(text.contains("Synthetic-1"));
}

#[test]
fn pure_noise_candidate_is_not_significant() {
    init_logging();
    let noise = SyntheticLightCurve {
        variability: None,
        noise_ppm: 1000.0,
        ..recipe(vec![])
    };
    let archive = archive(&noise);
    let mut cfg = config(vec![]);
    cfg.candidate_search.rank.count = 1;
    cfg.vetting.fap.trials = 40;

    let analysis = Pipeline::new(&archive, cfg).unwrap().run_habitable_zone().unwrap();
    let report = &analysis.summary.candidates[0].report;
    let fap = &report.checks[1];
    assert_eq!(fap.kind, CheckKind::FalseAlarmProbability);
    assert_eq!(fap.status, CheckStatus::Fail, "{}", fap.detail);
    assert!(!report.verdict.is_accepted());
}

#[test]
fn identical_seeds_give_identical_reports() {
    init_logging();
    let archive = archive(&recipe(vec![InjectedTransit::new(5.1, 1327.0, 0.0015, 0.1)]));
    let cfg = config(vec![]);

    let a = Pipeline::new(&archive, cfg.clone()).unwrap().run_habitable_zone().unwrap();
    let b = Pipeline::new(&archive, cfg).unwrap().run_habitable_zone().unwrap();
    assert_eq!(a.summary, b.summary);
}

#[test]
fn eclipsing_binary_fails_odd_even() {
    init_logging();
    let binary = InjectedTransit {
        odd_depth_ratio: 0.3,
        ..InjectedTransit::new(4.3, 1326.1, 0.004, 0.12)
    };
    let archive = archive(&recipe(vec![binary]));
    let cfg = config(vec![]);

    let analysis = Pipeline::new(&archive, cfg).unwrap().run_habitable_zone().unwrap();
    let eb = analysis
        .summary
        .candidates
        .iter()
        .find(|c| (c.report.candidate.period - 4.3).abs() < 0.05)
        .expect("binary period among candidates");

    let odd_even = &eb.report.checks[3];
    assert_eq!(odd_even.kind, CheckKind::OddEvenConsistency);
    assert_eq!(odd_even.status, CheckStatus::Fail);
    assert!(eb.report.verdict.is_rejected());
}

#[test]
fn missing_proxy_leaves_activity_inconclusive() {
    init_logging();
    let archive = archive(&recipe(vec![InjectedTransit::new(4.3, 1326.1, 0.002, 0.12)]));
    let mut cfg = config(vec![]);
    cfg.activity_proxy = ProxySource::Supplied;

    let analysis = Pipeline::new(&archive, cfg).unwrap().run_habitable_zone().unwrap();
    for c in &analysis.summary.candidates {
        let activity = &c.report.checks[4];
        assert_eq!(activity.kind, CheckKind::ActivityCorrelation);
        assert_eq!(activity.status, CheckStatus::Inconclusive);
        assert!(!c.report.verdict.is_accepted());
    }
}

#[test]
fn trojan_search_on_hot_jupiter() {
    init_logging();
    let epoch_bjd = 2_458_326.2;
    let quiet = SyntheticLightCurve {
        variability: None,
        ..recipe(vec![InjectedTransit::new(2.2, 1326.2, 0.005, 0.15)])
    };
    let archive = archive(&quiet);
    let cfg = config(vec![planet(2.2, epoch_bjd, 5000.0)]);

    let analysis = Pipeline::new(&archive, cfg).unwrap().run_trojan().unwrap();
    let result = &analysis.result;

    assert!(result.validation.matches, "{:?}", result.validation);
    assert!(result.detections().is_empty());
    assert!(result.upper_limit_ppm.is_some());
    // 54 days of data at P = 2.2 d.
    assert!((24..=25).contains(&result.transit_times.len()));

    let dir = tempfile::tempdir().unwrap();
    let path = report::write_json(dir.path(), "synthetic", result).unwrap();
    assert!(fs::read_to_string(path).unwrap().contains("\"upper_limit_ppm\""));
}

#[test]
fn trojan_without_known_planet_is_an_error() {
    let archive = archive(&recipe(vec![]));
    let err = Pipeline::new(&archive, config(vec![])).unwrap().run_trojan().unwrap_err();
    assert!(matches!(err, PipelineError::NoKnownPlanet(_)));
}

#[test]
fn local_archive_feeds_the_pipeline() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let sectors = recipe(vec![InjectedTransit::new(4.3, 1326.1, 0.002, 0.12)]).sectors();
    for s in &sectors {
        let path = dir.path().join(format!("tic1000001_s{:02}.csv", s.sector));
        let mut f = fs::File::create(path).unwrap();
        writeln!(f, "time,flux,flux_err,quality").unwrap();
        for i in 0..s.len() {
            writeln!(f, "{},{},{},{}", s.time[i], s.flux[i], s.flux_err[i], s.quality[i]).unwrap();
        }
    }

    let local = LocalArchive::new(dir.path());
    assert_eq!(local.download_all(TARGET).unwrap().len(), sectors.len());

    let prepared = Pipeline::new(&local, config(vec![])).unwrap().prepare().unwrap();
    assert_eq!(prepared.raw.sectors, vec![45, 46]);
    let rotation = prepared.rotation_period.unwrap();
    assert!((rotation - 9.3).abs() < 1.0, "rotation {rotation}");
}

#[test]
fn unknown_target_is_an_error() {
    let archive = MemoryArchive::new();
    let err = Pipeline::new(&archive, config(vec![])).unwrap().prepare().unwrap_err();
    assert!(matches!(err, PipelineError::Archive(_)));
}
