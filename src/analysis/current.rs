use anyhow::{Context, Result, bail};

use super::uncertainty::Measured;
use crate::data::model::FilterResult;

/// Transimpedance gain of the PMT preamplifier, in kΩ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreampGain(pub f64);

impl PreampGain {
    /// Parse a gain as written in the metadata store: `1M`, `200k`, or plain
    /// ohms.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let parse = |number: &str| -> Result<f64> {
            number
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid preamp gain '{text}'"))
        };
        let kilo_ohms = match text.chars().last() {
            Some('M' | 'm') => parse(&text[..text.len() - 1])? * 1000.0,
            Some('k' | 'K') => parse(&text[..text.len() - 1])?,
            _ => parse(text)? / 1000.0,
        };
        if !(kilo_ohms.is_finite() && kilo_ohms > 0.0) {
            bail!("preamp gain must be positive, got '{text}'");
        }
        Ok(Self(kilo_ohms))
    }

    pub fn kilo_ohms(&self) -> f64 {
        self.0
    }

    /// Anode current in µA for a preamp output voltage.
    pub fn anode_current_ua(&self, volts: f64) -> f64 {
        volts / self.0 * 1000.0
    }
}

/// Per-filter anode currents (µA) with their uncertainties.
pub fn anode_currents(results: &[FilterResult], gain: PreampGain) -> Vec<Measured> {
    results
        .iter()
        .map(|r| {
            Measured::new(
                gain.anode_current_ua(r.level),
                gain.anode_current_ua(r.level_err),
            )
        })
        .collect()
}

/// Where the brightest anode current of a run falls relative to the
/// allowed operating window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentCheck {
    Within,
    AboveMax,
    BelowMin,
}

impl CurrentCheck {
    pub fn evaluate(max_current_ua: f64, min_allowed: f64, max_allowed: f64) -> Self {
        if max_current_ua > max_allowed {
            CurrentCheck::AboveMax
        } else if max_current_ua < min_allowed {
            CurrentCheck::BelowMin
        } else {
            CurrentCheck::Within
        }
    }
}
