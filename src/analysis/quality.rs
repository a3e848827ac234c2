use log::debug;

use super::{mean, std_dev};
use super::edges::TransitionSequence;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnomalyKind, Result};

/// Number of values further than `threshold` standard deviations from the mean.
pub fn count_anomalies(values: &[f64], threshold: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let m = mean(values);
    let limit = threshold * std_dev(values);
    values.iter().filter(|v| (*v - m).abs() > limit).count()
}

/// Anomalous share of `values`, in percent. Zero for an empty slice.
pub fn anomaly_percent(values: &[f64], threshold: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    count_anomalies(values, threshold) as f64 / values.len() as f64 * 100.0
}

/// Level screen over the raw samples of one trace.
pub fn screen_levels(label: &str, samples: &[f64], config: &AnalysisConfig) -> Result<()> {
    let percent = anomaly_percent(samples, config.anomaly_sigma);
    check(label, AnomalyKind::Level, percent, config)
}

/// Periodicity screen over the spacing of detected transitions.
pub fn screen_periods(
    label: &str,
    transitions: &TransitionSequence,
    config: &AnalysisConfig,
) -> Result<()> {
    let periods: Vec<f64> = transitions.periods().into_iter().map(|p| p as f64).collect();
    let percent = anomaly_percent(&periods, config.anomaly_sigma);
    check(label, AnomalyKind::Period, percent, config)
}

fn check(label: &str, kind: AnomalyKind, percent: f64, config: &AnalysisConfig) -> Result<()> {
    debug!("{label}: {percent:.3}% {kind} anomalies");
    if percent > config.anomaly_percent_limit {
        return Err(AnalysisError::DataQuality {
            label: label.to_string(),
            kind,
            percent,
            limit: config.anomaly_percent_limit,
        });
    }
    Ok(())
}
