use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// AnalysisConfig – immutable parameters of one analysis run
// ---------------------------------------------------------------------------

/// Parameters of the analysis pipeline. Every field has a default matching the
/// test-stand hardware; a TOML file may override any subset of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Digitizer rate before prescaling, in samples/s.
    pub adc_rate: f64,
    /// Percentage of a half-cycle plateau used for H/L selection.
    pub selection_ratio: f64,
    pub pairwise_frequency: u32,
    pub quartet_frequency: u32,
    pub force_pairwise: bool,
    pub force_quartet: bool,
    /// Anomaly rule: `|x - mean| > anomaly_sigma * std`.
    pub anomaly_sigma: f64,
    /// Maximum tolerated anomaly fraction, in percent.
    pub anomaly_percent_limit: f64,
    /// Pedestal drift tolerance as a fraction of the average pedestal noise.
    pub drift_fraction: f64,
    /// Fraction of the nominal record length every trace must provide.
    pub length_fraction: f64,
    /// The last timestamp of a capture must exceed this value.
    pub min_final_timestamp: f64,
    /// Minimum peak separation as a fraction of the edge kernel size.
    pub peak_distance_fraction: f64,
    /// Number of filter positions entering the asymmetry analysis (from 1).
    pub filter_count: usize,
    /// Number of filter positions recorded per run (analysis + auxiliary).
    pub recorded_positions: usize,
    /// Published ND transmissions in percent, brightest first.
    pub filter_transmission: Vec<f64>,
    pub anode_current_max_ua: f64,
    pub anode_current_min_ua: f64,
    pub default_preamp_gain_kohm: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            adc_rate: 14_705_883.0,
            selection_ratio: 60.0,
            pairwise_frequency: 1920,
            quartet_frequency: 960,
            force_pairwise: false,
            force_quartet: false,
            anomaly_sigma: 3.0,
            anomaly_percent_limit: 1.0,
            drift_fraction: 0.2,
            length_fraction: 0.9,
            min_final_timestamp: 100.0,
            peak_distance_fraction: 0.9,
            filter_count: 9,
            recorded_positions: 11,
            filter_transmission: vec![
                100.0, 79.0, 63.0, 50.0, 40.0, 32.0, 25.0, 10.0, 5.0, 1.0, 0.1, 0.01,
            ],
            anode_current_max_ua: 10.0,
            anode_current_min_ua: 8.0,
            default_preamp_gain_kohm: 200.0,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a TOML file; absent keys keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Samples per chopper cycle at the given effective rate and frequency.
    pub fn samples_per_cycle(&self, sample_rate: f64, chopper_frequency: u32) -> f64 {
        sample_rate / f64::from(chopper_frequency)
    }

    /// Check internal consistency before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if self.filter_count < 2 {
            return Err(AnalysisError::ConfigMismatch(format!(
                "filter_count must be at least 2, got {}",
                self.filter_count
            )));
        }
        if self.recorded_positions < self.filter_count {
            return Err(AnalysisError::ConfigMismatch(format!(
                "recorded_positions ({}) is smaller than filter_count ({})",
                self.recorded_positions, self.filter_count
            )));
        }
        if self.filter_transmission.len() < self.filter_count {
            return Err(AnalysisError::ConfigMismatch(format!(
                "{} filter transmissions listed for {} filters",
                self.filter_transmission.len(),
                self.filter_count
            )));
        }
        if !(self.selection_ratio > 0.0 && self.selection_ratio <= 100.0) {
            return Err(AnalysisError::ConfigMismatch(format!(
                "selection_ratio must be in (0, 100], got {}",
                self.selection_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AnalysisConfig = toml::from_str("selection_ratio = 50.0\nforce_quartet = true\n")
            .unwrap();
        assert_eq!(cfg.selection_ratio, 50.0);
        assert!(cfg.force_quartet);
        assert_eq!(cfg.pairwise_frequency, 1920);
        assert_eq!(cfg.filter_count, 9);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn short_transmission_table_is_rejected() {
        let cfg = AnalysisConfig {
            filter_transmission: vec![100.0, 50.0],
            ..AnalysisConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AnalysisError::ConfigMismatch(_))));
    }
}
