//! Trojan (L4/L5 co-orbital) search around known transiting planets.
//!
//! Without a preset both built-in targets are analysed in turn: HAT-P-7 b and
//! TOI-2109 b.
//!
//! Usage:
//! ```text
//! cargo run --release --bin trojan_search
//! cargo run --release --bin trojan_search -- --preset wasp_12.json --output-dir out
//! cargo run --release --bin trojan_search -- --demo --no-plot
//! ```

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use transit_core::archive::{LocalArchive, SectorArchive};
use transit_core::config::{self, TargetConfig};
use transit_core::pipeline::Pipeline;
use transit_core::plots::{self, FigureSize};
use transit_core::report;
use transit_core::synthetic;

#[derive(Parser)]
#[command(name = "trojan_search")]
#[command(about = "Search the L4 and L5 points of known planets for co-orbital transits")]
#[command(version)]
struct Args {
    /// Directory holding per-sector light-curve files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory for the JSON reports and figures
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// JSON preset; the first known planet is searched
    #[arg(long, value_name = "FILE")]
    preset: Option<PathBuf>,

    /// Analyse synthetic sectors with the planet injected
    #[arg(long)]
    demo: bool,

    /// Seed for the synthetic sectors
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Skip the PNG figures
    #[arg(long)]
    no_plot: bool,
}

fn search_target(args: &Args, cfg: &TargetConfig) -> Result<(), Box<dyn std::error::Error>> {
    let archive: Box<dyn SectorArchive> = if args.demo {
        Box::new(synthetic::demo_archive(cfg, args.seed))
    } else {
        Box::new(LocalArchive::new(&args.data_dir))
    };

    let analysis = Pipeline::new(archive.as_ref(), cfg.clone())?.run_trojan()?;
    println!("{}", report::format_trojan(&analysis));

    let stem = cfg.file_stem();
    let path = report::write_json(&args.output_dir, &format!("{stem}_trojan"), &analysis.result)?;
    println!("Saved: {}", path.display());
    if !args.no_plot {
        let path = plots::plot_trojan(&args.output_dir, &analysis, &stem, FigureSize::default())?;
        println!("Saved: {}", path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let targets = match &args.preset {
        Some(path) => vec![TargetConfig::from_json_file(path)?],
        None => vec![config::hat_p_7(), config::toi_2109()],
    };

    let mut failed = Vec::new();
    for cfg in &targets {
        info!("Analysing {}", cfg.name);
        if let Err(e) = search_target(&args, cfg) {
            error!("Trojan search for {} failed: {e}", cfg.name);
            failed.push(cfg.name.clone());
        }
    }

    outcome(&failed, targets.len())
}

/// Any failed target makes the run fail.
fn outcome(failed: &[String], total: usize) -> Result<(), Box<dyn std::error::Error>> {
    if failed.is_empty() {
        return Ok(());
    }
    Err(format!(
        "{} of {} Trojan searches failed: {}",
        failed.len(),
        total,
        failed.join(", ")
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_failed_target_fails_the_run() {
        let err = outcome(&["TOI-2109".to_string()], 2).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 Trojan searches failed: TOI-2109");
    }

    #[test]
    fn no_failures_succeeds() {
        assert!(outcome(&[], 2).is_ok());
    }
}
