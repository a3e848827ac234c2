use std::path::Path;

use log::{debug, error, info};

use crate::analysis::asymmetry::aggregate;
use crate::analysis::current::{PreampGain, anode_currents};
use crate::analysis::edges::EdgeDetector;
use crate::analysis::linearity::{LinearityFitResult, quantify};
use crate::analysis::pairs::{AnalysisMode, comparison_count, select_pairs, window_half_width};
use crate::analysis::pedestal::{PedestalSummary, correct};
use crate::analysis::quality::{screen_levels, screen_periods};
use crate::analysis::uncertainty::Measured;
use crate::config::AnalysisConfig;
use crate::data::loader::load_run;
use crate::data::metadata::{MetadataStore, format_list};
use crate::data::model::{FilterResult, RunData, TracePosition};
use crate::data::settings::AcquisitionSettings;
use crate::error::{AnalysisError, Result};

pub const KEY_CHOPPER_FREQUENCY: &str = "Chopper_Frequency(Hz)";
pub const KEY_PMT_SERIAL: &str = "PMT_Serial";
pub const KEY_RECORD_TIME: &str = "Record_Time(s)";
pub const KEY_PREAMP_GAIN: &str = "Preamp_gain(Ohm)";

// ---------------------------------------------------------------------------
// Asymmetry stage
// ---------------------------------------------------------------------------

/// Per-filter asymmetries of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AsymmetryReport {
    pub mode: AnalysisMode,
    pub pedestal: PedestalSummary,
    /// One entry per analysis filter, brightest first.
    pub filters: Vec<FilterResult>,
}

/// Pedestal-correct a run, screen it, and extract the asymmetry of every
/// analysis filter.
///
/// All screens run before any asymmetry is computed, so a rejected run
/// produces nothing.
pub fn analyse_asymmetry(
    mut run: RunData,
    chopper_frequency: u32,
    config: &AnalysisConfig,
) -> Result<AsymmetryReport> {
    config.validate()?;
    if run.filters.len() < config.filter_count {
        return Err(AnalysisError::ConfigMismatch(format!(
            "{} filter captures loaded, {} required",
            run.filters.len(),
            config.filter_count
        )));
    }
    let mode = AnalysisMode::select(chopper_frequency, config)?;
    let pedestal = correct(&mut run, config.drift_fraction);

    let samples_per_cycle = config.samples_per_cycle(run.sample_rate, chopper_frequency);
    let detector = EdgeDetector::for_cycle(samples_per_cycle, config.peak_distance_fraction)
        .ok_or_else(|| {
            AnalysisError::ConfigMismatch(format!(
                "{samples_per_cycle:.2} samples per chopper cycle are too few for edge detection"
            ))
        })?;
    let w = window_half_width(samples_per_cycle, config.selection_ratio);
    debug!(
        "samples per cycle = {samples_per_cycle:.1}, kernel = {}, selection width = {}",
        detector.kernel_size(),
        2 * w
    );

    // Level screen: analysis filters and dark captures. Auxiliary positions
    // past `filter_count` are test-pedestal captures and are not screened.
    let screened = run
        .filters
        .iter()
        .take(config.filter_count)
        .chain([&run.pedestal.pre, &run.pedestal.post]);
    for capture in screened {
        screen_levels(&capture.position.to_string(), &capture.pmt, config)?;
    }

    let analysed = &run.filters[..config.filter_count];
    let mut transitions = Vec::with_capacity(analysed.len());
    for capture in analysed {
        let seq = detector.detect(&capture.pmt);
        screen_periods(&capture.position.to_string(), &seq, config)?;
        transitions.push(seq);
    }

    let mut filters = Vec::with_capacity(analysed.len());
    for (capture, seq) in analysed.iter().zip(&transitions) {
        let label = capture.position.to_string();
        if comparison_count(seq.len()) == 0 {
            return Err(AnalysisError::InsufficientCycles {
                label,
                transitions: seq.len(),
            });
        }
        let pairs = select_pairs(mode, &capture.pmt, seq, w);
        if pairs.is_empty() {
            return Err(AnalysisError::InsufficientCycles {
                label,
                transitions: seq.len(),
            });
        }
        let position = match capture.position {
            TracePosition::Filter(n) => n,
            _ => 0,
        };
        let result = aggregate(position, &pairs, &capture.photodiode);
        debug!(
            "{label}: A = {:.5e} ± {:.2e}, level = {:.4} V over {} pairs",
            result.asymmetry, result.asymmetry_err, result.level, result.pairs
        );
        filters.push(result);
    }

    Ok(AsymmetryReport {
        mode,
        pedestal,
        filters,
    })
}

// ---------------------------------------------------------------------------
// Linearity stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LinearityReport {
    pub gain: PreampGain,
    /// Anode current per analysis filter, µA.
    pub currents: Vec<Measured>,
    pub fit: LinearityFitResult,
}

impl LinearityReport {
    pub fn max_current(&self) -> f64 {
        self.currents
            .iter()
            .map(|c| c.value)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_current(&self) -> f64 {
        self.currents
            .iter()
            .map(|c| c.value)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Convert levels to anode current and fit asymmetry against it.
pub fn analyse_linearity(report: &AsymmetryReport, gain: PreampGain) -> Result<LinearityReport> {
    let currents = anode_currents(&report.filters, gain);
    let asymmetry: Vec<Measured> = report
        .filters
        .iter()
        .map(|r| Measured::new(r.asymmetry, r.asymmetry_err))
        .collect();
    let fit = quantify(&currents, &asymmetry)?;
    Ok(LinearityReport {
        gain,
        currents,
        fit,
    })
}

// ---------------------------------------------------------------------------
// Run directory
// ---------------------------------------------------------------------------

/// Complete outcome of one run directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RunAnalysis {
    pub serial: Option<String>,
    pub chopper_frequency: u32,
    pub asymmetry: AsymmetryReport,
    pub linearity: LinearityReport,
}

/// Analyse a run directory without modifying it.
pub fn analyse_run(run_dir: &Path, config: &AnalysisConfig) -> Result<RunAnalysis> {
    let store = MetadataStore::load(run_dir)?;
    analyse_with_store(run_dir, &store, config)
}

fn analyse_with_store(
    run_dir: &Path,
    store: &MetadataStore,
    config: &AnalysisConfig,
) -> Result<RunAnalysis> {
    config.validate()?;
    let serial = store.get(KEY_PMT_SERIAL).map(str::to_string);
    let chopper_frequency: u32 = store.get_parsed(KEY_CHOPPER_FREQUENCY)?;
    let gain = match store.get(KEY_PREAMP_GAIN) {
        Some(text) => PreampGain::parse(text)?,
        None => {
            info!(
                "no {KEY_PREAMP_GAIN} entry, assuming {} kΩ",
                config.default_preamp_gain_kohm
            );
            PreampGain(config.default_preamp_gain_kohm)
        }
    };
    info!(
        "analysing {} (PMT {}, {chopper_frequency} Hz, record time {}s)",
        run_dir.display(),
        serial.as_deref().unwrap_or("?"),
        store.get(KEY_RECORD_TIME).unwrap_or("?")
    );

    let settings = AcquisitionSettings::load(run_dir)?;
    let run = load_run(run_dir, config, &settings)?;
    let asymmetry = analyse_asymmetry(run, chopper_frequency, config)?;
    let linearity = analyse_linearity(&asymmetry, gain)?;

    info!(
        "non-linearity = ({:.3} ± {:.3}) %, chi2/ndf = {:.1}/{}",
        linearity.fit.non_linearity_pct,
        linearity.fit.non_linearity_err_pct.abs(),
        linearity.fit.fit.chi_square,
        linearity.fit.fit.ndf
    );
    Ok(RunAnalysis {
        serial,
        chopper_frequency,
        asymmetry,
        linearity,
    })
}

/// Write the results of a run into its metadata store (in memory).
pub fn record_results(store: &mut MetadataStore, analysis: &RunAnalysis) {
    let ped = &analysis.asymmetry.pedestal;
    let lin = &analysis.linearity;
    let fit = &lin.fit;

    let currents: Vec<f64> = lin.currents.iter().map(|c| c.value).collect();
    let current_errs: Vec<f64> = lin.currents.iter().map(|c| c.err).collect();
    let asymmetry: Vec<f64> = analysis.asymmetry.filters.iter().map(|f| f.asymmetry).collect();
    let asymmetry_errs: Vec<f64> = analysis
        .asymmetry
        .filters
        .iter()
        .map(|f| f.asymmetry_err)
        .collect();

    store.upsert(
        "Pedestal_Means[pre,post](V)",
        format_list(&[ped.pre_mean, ped.post_mean]),
    );
    store.upsert(
        "Pedestal_STD[pre,post](V)",
        format_list(&[ped.pre_std, ped.post_std]),
    );
    store.upsert("Asymmetry_Method", analysis.asymmetry.mode.to_string());
    store.upsert("Non-Linearity(%)", format!("{:.2}", fit.non_linearity_pct));
    store.upsert(
        "Non-Linearity_Uncertainty(%)",
        format!("{:.2}", fit.non_linearity_err_pct.abs()),
    );
    store.upsert("Linear_Fit_Chi_Square", format!("{:.1}", fit.fit.chi_square));
    store.upsert("Linear_Fit_degrees_of_freedom", fit.fit.ndf.to_string());
    store.upsert("Linear_Fit_Slope", fit.fit.slope.to_string());
    store.upsert("Linear_Fit_Intercept", fit.fit.intercept.to_string());
    store.upsert("Minimum_Anode_Current(uA)", format!("{:.2}", lin.min_current()));
    store.upsert("Maximum_Anode_Current(uA)", format!("{:.2}", lin.max_current()));
    store.upsert("X-Anode_Current(uA)", format_list(&currents));
    store.upsert("Y-Asymmetry", format_list(&asymmetry));
    store.upsert("Asymmetry_Uncertainty", format_list(&asymmetry_errs));
    store.upsert("Anode_Current_Uncertainty(uA)", format_list(&current_errs));
    store.upsert("Mean_dAdI(uA^-1)", fit.mean_sensitivity.to_string());
    store.upsert("Mean_dAdI_Uncertainty(uA^-1)", fit.mean_sensitivity_err.to_string());
}

/// Analyse a run directory and, on success, persist the results into its
/// metadata store. A failed run leaves the store untouched.
pub fn analyse_and_record(run_dir: &Path, config: &AnalysisConfig) -> Result<RunAnalysis> {
    let mut store = MetadataStore::load(run_dir)?;
    match analyse_with_store(run_dir, &store, config) {
        Ok(analysis) => {
            record_results(&mut store, &analysis);
            store.persist()?;
            Ok(analysis)
        }
        Err(e) => {
            error!(
                "{}: analysis failed: {e}",
                store.get(KEY_PMT_SERIAL).unwrap_or("unknown PMT")
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnomalyKind;
    use crate::synthetic::SyntheticRun;
    use approx::assert_relative_eq;

    const RATE: f64 = 76_800.0;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn noiseless_square_wave_asymmetry_pairwise() {
        let run = SyntheticRun::sweep(&config(), RATE, 1920, 8_000, 0.5, 0.1).build();
        let report = analyse_asymmetry(run, 1920, &config()).unwrap();
        assert_eq!(report.mode, AnalysisMode::Pairwise);
        assert_eq!(report.filters.len(), 9);
        for f in &report.filters {
            assert_relative_eq!(f.asymmetry, 0.1, epsilon = 1e-9);
            assert!(f.pairs > 50);
        }
        assert_relative_eq!(report.filters[0].level, 0.5, epsilon = 1e-9);
        assert_relative_eq!(report.filters[8].level, 0.025, epsilon = 1e-9);
    }

    #[test]
    fn noiseless_square_wave_asymmetry_quartet() {
        let run = SyntheticRun::sweep(&config(), RATE, 960, 8_000, 0.5, 0.05).build();
        let report = analyse_asymmetry(run, 960, &config()).unwrap();
        assert_eq!(report.mode, AnalysisMode::Quartet);
        for f in &report.filters {
            assert_relative_eq!(f.asymmetry, 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn unsupported_frequency_aborts() {
        let run = SyntheticRun::sweep(&config(), RATE, 1920, 2_000, 0.5, 0.1).build();
        assert!(matches!(
            analyse_asymmetry(run, 1234, &config()),
            Err(AnalysisError::ConfigMismatch(_))
        ));
    }

    #[test]
    fn spiky_filter_rejects_the_run() {
        let mut run = SyntheticRun::sweep(&config(), RATE, 1920, 8_000, 0.5, 0.1)
            .with_noise(1e-4)
            .build();
        add_spikes(&mut run.filters[2].pmt);
        assert!(matches!(
            analyse_asymmetry(run, 1920, &config()),
            Err(AnalysisError::DataQuality { .. })
        ));
    }

    fn add_spikes(samples: &mut [f64]) {
        for (i, v) in samples.iter_mut().enumerate() {
            if i % 40 == 3 {
                *v += 5.0;
            }
        }
    }

    #[test]
    fn auxiliary_positions_skip_the_level_screen() {
        let mut run = SyntheticRun::sweep(&config(), RATE, 1920, 8_000, 0.5, 0.1)
            .with_noise(1e-4)
            .build();
        add_spikes(&mut run.filters[9].pmt);
        add_spikes(&mut run.filters[10].pmt);
        let report = analyse_asymmetry(run, 1920, &config()).unwrap();
        assert_eq!(report.filters.len(), 9);
    }

    #[test]
    fn spiky_dark_capture_rejects_the_run() {
        let mut run = SyntheticRun::sweep(&config(), RATE, 1920, 8_000, 0.5, 0.1)
            .with_noise(1e-4)
            .build();
        add_spikes(&mut run.pedestal.pre.pmt);
        match analyse_asymmetry(run, 1920, &config()) {
            Err(AnalysisError::DataQuality { label, kind, .. }) => {
                assert_eq!(label, "pre-pedestal");
                assert_eq!(kind, AnomalyKind::Level);
            }
            other => panic!("expected a level anomaly, got {other:?}"),
        }
    }

    #[test]
    fn spiky_post_pedestal_rejects_the_run() {
        let mut run = SyntheticRun::sweep(&config(), RATE, 1920, 8_000, 0.5, 0.1)
            .with_noise(1e-4)
            .build();
        add_spikes(&mut run.pedestal.post.pmt);
        assert!(matches!(
            analyse_asymmetry(run, 1920, &config()),
            Err(AnalysisError::DataQuality { .. })
        ));
    }

    #[test]
    fn too_short_trace_has_insufficient_cycles() {
        let run = SyntheticRun::sweep(&config(), RATE, 1920, 120, 0.5, 0.1).build();
        assert!(matches!(
            analyse_asymmetry(run, 1920, &config()),
            Err(AnalysisError::InsufficientCycles { .. })
        ));
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let run = SyntheticRun::sweep(&config(), RATE, 1920, 6_000, 0.5, 0.1)
            .with_noise(1e-4)
            .build();
        let a = analyse_asymmetry(run.clone(), 1920, &config()).unwrap();
        let b = analyse_asymmetry(run, 1920, &config()).unwrap();
        assert_eq!(a, b);
    }
}
