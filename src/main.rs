use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use pmt_linearity::AnalysisConfig;
use pmt_linearity::analysis::current::CurrentCheck;
use pmt_linearity::analyse_and_record;

/// Measure PMT non-linearity from a filter-sweep run directory.
#[derive(Parser, Debug)]
#[command(name = "pmt-linearity")]
#[command(about = "PMT non-linearity analysis from chopper-modulated LED waveforms")]
struct Args {
    /// Run directory holding the captures, CMDataSettings.txt and Experiment_data.txt
    run_dir: PathBuf,

    /// TOML analysis configuration; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use pairwise window selection regardless of the chopper frequency
    #[arg(long, conflicts_with = "quartet")]
    pairwise: bool,

    /// Use quartet window selection regardless of the chopper frequency
    #[arg(long)]
    quartet: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match AnalysisConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e:#}");
                return ExitCode::from(1);
            }
        },
        None => AnalysisConfig::default(),
    };
    config.force_pairwise |= args.pairwise;
    config.force_quartet |= args.quartet;

    let analysis = match analyse_and_record(&args.run_dir, &config) {
        Ok(analysis) => analysis,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        }
    };

    let max_current = analysis.linearity.max_current();
    info!(
        "{}: non-linearity {:.2} % at {max_current:.2} uA",
        analysis.serial.as_deref().unwrap_or("PMT"),
        analysis.linearity.fit.non_linearity_pct
    );

    match CurrentCheck::evaluate(
        max_current,
        config.anode_current_min_ua,
        config.anode_current_max_ua,
    ) {
        CurrentCheck::Within => ExitCode::SUCCESS,
        CurrentCheck::AboveMax => {
            warn!(
                "maximum anode current {max_current:.2} uA exceeds {} uA",
                config.anode_current_max_ua
            );
            ExitCode::from(2)
        }
        CurrentCheck::BelowMin => {
            warn!(
                "maximum anode current {max_current:.2} uA is below {} uA",
                config.anode_current_min_ua
            );
            ExitCode::from(3)
        }
    }
}
