//! H/L window selection.
//!
//! Both strategies walk the detected transitions two at a time, skipping the
//! first two (start-of-trace artifacts) and leaving the last ones unused so no
//! window is truncated by the end of the trace. The offsets below are the
//! established alignment conventions of the test stand.

use std::fmt;
use std::ops::Range;

use log::{info, warn};

use super::edges::TransitionSequence;
use crate::config::AnalysisConfig;
use crate::data::model::CyclePair;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// AnalysisMode
// ---------------------------------------------------------------------------

/// How transitions are grouped into one High/Low comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisMode {
    /// Every adjacent pair of plateaus.
    Pairwise,
    /// Two half-windows around one plateau against the plateau between them.
    Quartet,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Pairwise => write!(f, "Pairwise"),
            AnalysisMode::Quartet => write!(f, "Quartet"),
        }
    }
}

impl AnalysisMode {
    /// Pick the mode for a chopper frequency, honouring forced modes.
    pub fn select(chopper_frequency: u32, config: &AnalysisConfig) -> Result<Self> {
        if config.force_pairwise && config.force_quartet {
            return Err(AnalysisError::ConfigMismatch(
                "cannot force pairwise and quartet analysis at the same time".to_string(),
            ));
        }
        let natural = if chopper_frequency == config.pairwise_frequency {
            AnalysisMode::Pairwise
        } else if chopper_frequency == config.quartet_frequency {
            AnalysisMode::Quartet
        } else {
            return Err(AnalysisError::ConfigMismatch(format!(
                "chopper frequency {chopper_frequency} Hz matches neither pairwise ({} Hz) nor quartet ({} Hz) analysis",
                config.pairwise_frequency, config.quartet_frequency
            )));
        };

        let forced = if config.force_pairwise {
            Some(AnalysisMode::Pairwise)
        } else if config.force_quartet {
            Some(AnalysisMode::Quartet)
        } else {
            None
        };
        match forced {
            Some(mode) => {
                info!("Forcing {mode} analysis on {chopper_frequency} Hz data");
                Ok(mode)
            }
            None => Ok(natural),
        }
    }

    pub fn selector(self) -> &'static dyn WindowSelector {
        match self {
            AnalysisMode::Pairwise => &Pairwise,
            AnalysisMode::Quartet => &Quartet,
        }
    }
}

// ---------------------------------------------------------------------------
// WindowSelector
// ---------------------------------------------------------------------------

/// Selects the plateau windows of comparison `u` from a transition sequence.
pub trait WindowSelector {
    /// Mean levels of the two compared windows, or `None` if a window falls
    /// outside the trace.
    fn window_means(
        &self,
        trace: &[f64],
        peaks: &[usize],
        u: usize,
        w: usize,
    ) -> Option<(f64, f64)>;
}

/// Selection window half-width for a cycle length and a selection ratio (%).
pub fn window_half_width(samples_per_cycle: f64, selection_ratio: f64) -> usize {
    (samples_per_cycle * selection_ratio / 400.0).floor() as usize
}

/// Number of comparisons a transition sequence supports.
pub fn comparison_count(transitions: usize) -> usize {
    (transitions / 2).saturating_sub(2)
}

/// Build every [`CyclePair`] of one trace.
pub fn select_pairs(
    mode: AnalysisMode,
    trace: &[f64],
    transitions: &TransitionSequence,
    w: usize,
) -> Vec<CyclePair> {
    let selector = mode.selector();
    let peaks = transitions.peaks();
    let count = comparison_count(peaks.len());

    let mut pairs = Vec::with_capacity(count);
    for u in 0..count {
        match selector.window_means(trace, peaks, u, w) {
            Some((a, b)) => pairs.push(CyclePair::from_means(a, b)),
            None => warn!("comparison {u}: {mode} window outside the trace, skipped"),
        }
    }
    pairs
}

/// Pairwise: `[p(2u+2) - w, p(2u+2) + w)` against `[p(2u+3) - w, p(2u+3) + w)`.
#[derive(Debug, Clone, Copy)]
pub struct Pairwise;

impl WindowSelector for Pairwise {
    fn window_means(
        &self,
        trace: &[f64],
        peaks: &[usize],
        u: usize,
        w: usize,
    ) -> Option<(f64, f64)> {
        let v1 = centered(peaks, 2 * u + 2, w)?;
        let v2 = centered(peaks, 2 * u + 3, w)?;
        Some((window_mean(trace, &[v1])?, window_mean(trace, &[v2])?))
    }
}

/// Quartet: `[p(a), p(a) + w) ∪ [p(a+2) - w, p(a+2))` against
/// `[p(a+1) - w, p(a+1) + w)`, with `a = 2u + 2`. If the first group comes out
/// lower, the phase grouping is off by one and `a = 2u + 3` is used instead.
#[derive(Debug, Clone, Copy)]
pub struct Quartet;

impl Quartet {
    fn grouped(trace: &[f64], peaks: &[usize], a: usize, w: usize) -> Option<(f64, f64)> {
        let first = *peaks.get(a)?;
        let last = *peaks.get(a + 2)?;
        let outer = [first..first + w, last.checked_sub(w)?..last];
        let inner = centered(peaks, a + 1, w)?;
        Some((window_mean(trace, &outer)?, window_mean(trace, &[inner])?))
    }
}

impl WindowSelector for Quartet {
    fn window_means(
        &self,
        trace: &[f64],
        peaks: &[usize],
        u: usize,
        w: usize,
    ) -> Option<(f64, f64)> {
        let (v1, v2) = Self::grouped(trace, peaks, 2 * u + 2, w)?;
        if v1 < v2 {
            return Self::grouped(trace, peaks, 2 * u + 3, w);
        }
        Some((v1, v2))
    }
}

fn centered(peaks: &[usize], index: usize, w: usize) -> Option<Range<usize>> {
    let p = *peaks.get(index)?;
    Some(p.checked_sub(w)?..p + w)
}

/// Mean over the concatenation of `ranges`; `None` if any range leaves the
/// trace or all are empty.
fn window_mean(trace: &[f64], ranges: &[Range<usize>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for r in ranges {
        let samples = trace.get(r.clone())?;
        sum += samples.iter().sum::<f64>();
        n += samples.len();
    }
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::edges::EdgeDetector;
    use crate::synthetic::SquareWave;
    use approx::assert_relative_eq;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn mode_follows_frequency() {
        assert_eq!(AnalysisMode::select(1920, &config()).unwrap(), AnalysisMode::Pairwise);
        assert_eq!(AnalysisMode::select(960, &config()).unwrap(), AnalysisMode::Quartet);
        assert!(matches!(
            AnalysisMode::select(1000, &config()),
            Err(AnalysisError::ConfigMismatch(_))
        ));
    }

    #[test]
    fn forced_modes() {
        let cfg = AnalysisConfig {
            force_quartet: true,
            ..config()
        };
        assert_eq!(AnalysisMode::select(1920, &cfg).unwrap(), AnalysisMode::Quartet);

        let both = AnalysisConfig {
            force_pairwise: true,
            force_quartet: true,
            ..config()
        };
        assert!(matches!(
            AnalysisMode::select(1920, &both),
            Err(AnalysisError::ConfigMismatch(_))
        ));
    }

    #[test]
    fn window_width_and_count() {
        assert_eq!(window_half_width(766.0, 60.0), 114);
        assert_eq!(window_half_width(40.0, 60.0), 6);
        assert_eq!(comparison_count(11), 3);
        assert_eq!(comparison_count(3), 0);
    }

    #[test]
    fn pairwise_windows_on_known_peaks() {
        // plateaus of 10 samples alternating 2.0 / 1.0, peaks at plateau centres
        let trace: Vec<f64> = (0..100)
            .map(|i| if (i / 10) % 2 == 0 { 2.0 } else { 1.0 })
            .collect();
        let peaks: Vec<usize> = (0..10).map(|j| 5 + 10 * j).collect();
        let (a, b) = Pairwise.window_means(&trace, &peaks, 0, 3).unwrap();
        assert_eq!((a, b), (2.0, 1.0));
        let (a, b) = Pairwise.window_means(&trace, &peaks, 1, 3).unwrap();
        assert_eq!((a, b), (2.0, 1.0));
    }

    #[test]
    fn quartet_realigns_when_first_group_is_low() {
        let trace: Vec<f64> = (0..120)
            .map(|i| if (i / 10) % 2 == 0 { 1.0 } else { 2.0 })
            .collect();
        let peaks: Vec<usize> = (0..12).map(|j| 5 + 10 * j).collect();
        // a = 2 sits on a low plateau, so the selector shifts to a = 3
        let (v1, v2) = Quartet.window_means(&trace, &peaks, 0, 3).unwrap();
        assert_eq!((v1, v2), (2.0, 1.0));
    }

    #[test]
    fn out_of_range_windows_are_rejected() {
        let trace = vec![1.0; 20];
        assert!(Pairwise.window_means(&trace, &[0, 1, 4, 18], 0, 5).is_none());
        assert!(Quartet.window_means(&trace, &[2, 5, 8, 11], 0, 2).is_none());
    }

    fn square_trace(samples_per_cycle: f64, high: f64, low: f64) -> Vec<f64> {
        let wave = SquareWave {
            high,
            low,
            samples_per_cycle,
            phase: 3.0,
        };
        (0..8000).map(|i| wave.sample(i)).collect()
    }

    #[test]
    fn both_modes_recover_square_wave_asymmetry() {
        let expected = (1.1 - 0.9) / (1.1 + 0.9);
        for (mode, spc) in [(AnalysisMode::Pairwise, 40.0), (AnalysisMode::Quartet, 80.0)] {
            let trace = square_trace(spc, 1.1, 0.9);
            let seq = EdgeDetector::for_cycle(spc, 0.9).unwrap().detect(&trace);
            let pairs = select_pairs(mode, &trace, &seq, window_half_width(spc, 60.0));
            assert_eq!(pairs.len(), comparison_count(seq.len()));
            assert!(!pairs.is_empty());
            for p in pairs {
                assert_relative_eq!(p.asymmetry(), expected, epsilon = 1e-12);
            }
        }
    }
}
