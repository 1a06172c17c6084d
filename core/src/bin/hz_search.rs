//! Habitable-zone transit search for one target.
//!
//! Recovers the target's known planets, searches the habitable-zone period
//! range for new candidates and vets each one.  With no arguments it runs the
//! L 98-59 preset against sector files under `./data`.
//!
//! Usage:
//! ```text
//! cargo run --release --bin hz_search
//! cargo run --release --bin hz_search -- --data-dir /tess/lc --output-dir out --seed 7
//! cargo run --release --bin hz_search -- --preset my_target.json --activity s_index.csv
//! cargo run --release --bin hz_search -- --demo --fap-trials 50
//! ```

use std::path::PathBuf;

use clap::Parser;
use log::error;
use transit_core::activity::ActivityProxy;
use transit_core::archive::{LocalArchive, SectorArchive};
use transit_core::config::{self, TargetConfig};
use transit_core::pipeline::Pipeline;
use transit_core::plots::{self, FigureSize};
use transit_core::report;
use transit_core::synthetic;

#[derive(Parser)]
#[command(name = "hz_search")]
#[command(about = "Habitable-zone transit search and candidate vetting")]
#[command(version)]
struct Args {
    /// Directory holding per-sector light-curve files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory for the JSON report and figures
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// JSON preset replacing the built-in L 98-59 configuration
    #[arg(long, value_name = "FILE")]
    preset: Option<PathBuf>,

    /// CSV activity proxy (time,value) for the activity-correlation check
    #[arg(long, value_name = "FILE")]
    activity: Option<PathBuf>,

    /// Random seed for bootstrap and false-alarm trials
    #[arg(long)]
    seed: Option<u64>,

    /// Number of bootstrap resamples
    #[arg(long)]
    bootstrap_iterations: Option<usize>,

    /// Number of false-alarm permutations
    #[arg(long)]
    fap_trials: Option<usize>,

    /// Analyse synthetic sectors with the preset's planets injected
    #[arg(long)]
    demo: bool,

    /// Skip the PNG figure
    #[arg(long)]
    no_plot: bool,
}

fn load_config(args: &Args) -> Result<TargetConfig, Box<dyn std::error::Error>> {
    let mut cfg = match &args.preset {
        Some(path) => TargetConfig::from_json_file(path)?,
        None => config::l98_59(),
    };
    if let Some(seed) = args.seed {
        cfg.vetting.seed = seed;
    }
    if let Some(n) = args.bootstrap_iterations {
        cfg.vetting.bootstrap.iterations = n;
    }
    if let Some(n) = args.fap_trials {
        cfg.vetting.fap.trials = n;
    }
    Ok(cfg)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config(args)?;

    let archive: Box<dyn SectorArchive> = if args.demo {
        Box::new(synthetic::demo_archive(&cfg, cfg.vetting.seed))
    } else {
        Box::new(LocalArchive::new(&args.data_dir))
    };

    let mut pipeline = Pipeline::new(archive.as_ref(), cfg.clone())?;
    if let Some(path) = &args.activity {
        pipeline = pipeline.with_activity_proxy(ActivityProxy::from_csv(path)?);
    }

    let analysis = pipeline.run_habitable_zone()?;
    println!("{}", report::format_habitable_zone(&analysis.summary, &cfg));

    let path = report::write_json(&args.output_dir, &cfg.file_stem(), &analysis.summary)?;
    println!("Saved: {}", path.display());
    if !args.no_plot {
        let path = plots::plot_habitable_zone(&args.output_dir, &analysis, &cfg, FigureSize::default())?;
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("Habitable-zone search failed: {e}");
        return Err(e);
    }
    Ok(())
}
