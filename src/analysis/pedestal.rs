use log::{debug, warn};

use super::{mean, std_dev};
use crate::data::model::{Channel, PedestalMeasurement, RunData};

/// Dark-current statistics of one run and the baselines derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedestalSummary {
    pub pre_mean: f64,
    pub post_mean: f64,
    pub pre_std: f64,
    pub post_std: f64,
    /// PMT baseline: average of the two dark means.
    pub baseline: f64,
    /// Photodiode baseline: average of the two dark photodiode means.
    pub photodiode_baseline: f64,
    /// `|post_mean - pre_mean|`
    pub drift: f64,
    /// Drift reached `drift_fraction` of the average dark noise.
    pub drift_exceeded: bool,
}

impl PedestalSummary {
    pub fn from_measurement(pedestal: &PedestalMeasurement, drift_fraction: f64) -> Self {
        let pre_mean = mean(&pedestal.pre.pmt);
        let post_mean = mean(&pedestal.post.pmt);
        let pre_std = std_dev(&pedestal.pre.pmt);
        let post_std = std_dev(&pedestal.post.pmt);
        let photodiode_baseline =
            (mean(&pedestal.pre.photodiode) + mean(&pedestal.post.photodiode)) / 2.0;

        let drift = (post_mean - pre_mean).abs();
        let noise = (pre_std + post_std) / 2.0;
        Self {
            pre_mean,
            post_mean,
            pre_std,
            post_std,
            baseline: (pre_mean + post_mean) / 2.0,
            photodiode_baseline,
            drift,
            drift_exceeded: drift >= drift_fraction * noise,
        }
    }
}

/// Subtract the dark baselines from a run in place.
///
/// The PMT baseline is removed from every capture, dark captures included;
/// the photodiode baseline from the filter captures. Excessive drift between
/// the two dark captures is reported but does not stop the run.
pub fn correct(run: &mut RunData, drift_fraction: f64) -> PedestalSummary {
    let summary = PedestalSummary::from_measurement(&run.pedestal, drift_fraction);

    if summary.drift_exceeded {
        warn!(
            "pedestal drift {:.3e} V is at least {:.0}% of the average pedestal noise {:.3e} V",
            summary.drift,
            drift_fraction * 100.0,
            (summary.pre_std + summary.post_std) / 2.0
        );
    }
    debug!(
        "pedestal correction {:.4} V, photodiode {:.4} V",
        summary.baseline, summary.photodiode_baseline
    );

    for capture in &mut run.filters {
        capture.subtract_baseline(Channel::Pmt, summary.baseline);
        capture.subtract_baseline(Channel::Photodiode, summary.photodiode_baseline);
    }
    run.pedestal
        .pre
        .subtract_baseline(Channel::Pmt, summary.baseline);
    run.pedestal
        .post
        .subtract_baseline(Channel::Pmt, summary.baseline);

    summary
}
