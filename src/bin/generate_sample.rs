use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use pmt_linearity::AnalysisConfig;
use pmt_linearity::analysis::current::PreampGain;
use pmt_linearity::data::settings::AcquisitionSettings;
use pmt_linearity::synthetic::{SyntheticRun, write_run_dir};

/// Write a synthetic filter-sweep run directory.
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    /// Output run directory
    #[arg(default_value = "sample_run")]
    output: PathBuf,

    /// Chopper frequency (Hz)
    #[arg(long, default_value_t = 1920)]
    frequency: u32,

    /// Digitizer prescale
    #[arg(long, default_value_t = 100)]
    prescale: u32,

    /// Record length (s)
    #[arg(long, default_value_t = 0.5)]
    record_length: f64,

    /// PMT level of the unattenuated filter position (V)
    #[arg(long, default_value_t = 1.8)]
    full_scale: f64,

    /// Asymmetry extrapolated to zero current
    #[arg(long, default_value_t = 0.1)]
    asymmetry: f64,

    /// Change of asymmetry per uA of anode current
    #[arg(long, default_value_t = 0.0)]
    slope: f64,

    /// Gaussian noise per sample (V)
    #[arg(long, default_value_t = 2e-4)]
    noise: f64,

    /// Capture format: parquet, csv or json
    #[arg(long, default_value = "parquet")]
    format: String,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = AnalysisConfig::default();

    let settings = AcquisitionSettings {
        prescale: args.prescale,
        record_length: args.record_length,
    };
    let sample_rate = settings.sample_rate(config.adc_rate);
    let samples = (sample_rate * args.record_length).ceil() as usize;
    let gain = PreampGain(config.default_preamp_gain_kohm);

    let mut run = SyntheticRun::sweep(
        &config,
        sample_rate,
        args.frequency,
        samples,
        args.full_scale,
        args.asymmetry,
    )
    .with_noise(args.noise);
    run.seed = args.seed;
    run.asymmetry = run
        .levels
        .iter()
        .map(|&v| args.asymmetry + args.slope * gain.anode_current_ua(v))
        .collect();

    let metadata = [
        ("PMT_Serial", "SYNTH0001".to_string()),
        ("Chopper_Frequency(Hz)", args.frequency.to_string()),
        ("Record_Time(s)", args.record_length.to_string()),
        ("Preamp_gain(Ohm)", format!("{}k", gain.kilo_ohms())),
    ];
    write_run_dir(&args.output, &run.build(), &settings, &metadata, &args.format)?;

    println!(
        "Wrote {} captures of {samples} samples ({sample_rate:.0} S/s) to {}",
        run.levels.len() + 2,
        args.output.display()
    );
    Ok(())
}
