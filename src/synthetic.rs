//! Deterministic synthetic runs: chopper-modulated square waves with Gaussian
//! noise, for the sample generator and for tests.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::AnalysisConfig;
use crate::data::metadata::METADATA_FILE;
use crate::data::model::{PedestalMeasurement, RunData, TracePosition, WaveformCapture};
use crate::data::settings::{AcquisitionSettings, SETTINGS_FILE, render_settings};
use crate::data::writer::write_capture;

/// Minimal deterministic PRNG (xoshiro256**)
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Noise-free chopper modulation: `high` for the first half of each cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareWave {
    pub high: f64,
    pub low: f64,
    pub samples_per_cycle: f64,
    /// Phase shift in samples.
    pub phase: f64,
}

impl SquareWave {
    pub fn sample(&self, i: usize) -> f64 {
        let cycle_pos = ((i as f64 + self.phase) / self.samples_per_cycle).fract();
        if cycle_pos < 0.5 { self.high } else { self.low }
    }
}

// ---------------------------------------------------------------------------
// SyntheticRun
// ---------------------------------------------------------------------------

/// Parameters of a complete synthetic filter sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRun {
    pub sample_rate: f64,
    pub chopper_frequency: u32,
    /// Samples per capture.
    pub samples: usize,
    /// Mean PMT level (volts) of each recorded filter position, brightest first.
    pub levels: Vec<f64>,
    /// True asymmetry of each recorded filter position.
    pub asymmetry: Vec<f64>,
    /// Dark offset added to every PMT sample.
    pub pmt_pedestal: f64,
    pub photodiode_pedestal: f64,
    /// Photodiode volts per PMT volt.
    pub photodiode_ratio: f64,
    /// Gaussian noise on every sample, in volts.
    pub noise: f64,
    pub phase: f64,
    pub seed: u64,
}

impl SyntheticRun {
    /// A sweep over the configured ND transmissions with constant asymmetry.
    pub fn sweep(
        config: &AnalysisConfig,
        sample_rate: f64,
        chopper_frequency: u32,
        samples: usize,
        full_scale: f64,
        asymmetry: f64,
    ) -> Self {
        let levels: Vec<f64> = config
            .filter_transmission
            .iter()
            .take(config.recorded_positions)
            .map(|t| full_scale * t / 100.0)
            .collect();
        Self {
            sample_rate,
            chopper_frequency,
            samples,
            asymmetry: vec![asymmetry; levels.len()],
            levels,
            pmt_pedestal: 0.002,
            photodiode_pedestal: 0.001,
            photodiode_ratio: 0.4,
            noise: 0.0,
            phase: 0.0,
            seed: 42,
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn samples_per_cycle(&self) -> f64 {
        self.sample_rate / f64::from(self.chopper_frequency)
    }

    /// Generate every capture of the run.
    pub fn build(&self) -> RunData {
        let mut rng = SimpleRng::new(self.seed);

        let filters = self
            .levels
            .iter()
            .zip(&self.asymmetry)
            .enumerate()
            .map(|(i, (&level, &asy))| {
                let wave = SquareWave {
                    high: level * (1.0 + asy),
                    low: level * (1.0 - asy),
                    samples_per_cycle: self.samples_per_cycle(),
                    phase: self.phase,
                };
                self.capture(TracePosition::Filter(i + 1), &mut rng, |i| wave.sample(i))
            })
            .collect();

        let pre = self.capture(TracePosition::PrePedestal, &mut rng, |_| 0.0);
        let post = self.capture(TracePosition::PostPedestal, &mut rng, |_| 0.0);

        RunData {
            sample_rate: self.sample_rate,
            filters,
            pedestal: PedestalMeasurement { pre, post },
        }
    }

    fn capture(
        &self,
        position: TracePosition,
        rng: &mut SimpleRng,
        signal: impl Fn(usize) -> f64,
    ) -> WaveformCapture {
        let mut pmt = Vec::with_capacity(self.samples);
        let mut photodiode = Vec::with_capacity(self.samples);
        for i in 0..self.samples {
            let s = signal(i);
            pmt.push(s + self.pmt_pedestal + rng.gauss(0.0, self.noise));
            photodiode.push(
                s * self.photodiode_ratio + self.photodiode_pedestal + rng.gauss(0.0, self.noise),
            );
        }
        WaveformCapture {
            position,
            timestamp: (0..self.samples)
                .map(|i| i as f64 / self.sample_rate * 1000.0)
                .collect(),
            pmt,
            photodiode,
        }
    }
}

/// Write a run directory: every capture as `<stem>.<extension>`, the
/// acquisition settings, and a metadata store holding `metadata`.
pub fn write_run_dir(
    dir: &Path,
    run: &RunData,
    settings: &AcquisitionSettings,
    metadata: &[(&str, String)],
    extension: &str,
) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let captures = run
        .filters
        .iter()
        .chain([&run.pedestal.pre, &run.pedestal.post]);
    for capture in captures {
        let path = dir.join(format!("{}.{extension}", capture.position.file_stem()));
        write_capture(&path, capture)?;
    }

    std::fs::write(dir.join(SETTINGS_FILE), render_settings(settings))
        .context("writing acquisition settings")?;

    let text: String = metadata
        .iter()
        .map(|(k, v)| format!("{k}={v}\n"))
        .collect();
    std::fs::write(dir.join(METADATA_FILE), text).context("writing metadata store")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_deterministic() {
        let mut a = SimpleRng::new(3);
        let mut b = SimpleRng::new(3);
        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn square_wave_duty_cycle_is_half() {
        let wave = SquareWave {
            high: 1.0,
            low: 0.0,
            samples_per_cycle: 40.0,
            phase: 0.0,
        };
        let highs: usize = (0..400).map(|i| wave.sample(i) as usize).sum();
        assert_eq!(highs, 200);
    }

    #[test]
    fn sweep_levels_follow_transmissions() {
        let cfg = AnalysisConfig::default();
        let run = SyntheticRun::sweep(&cfg, 76_800.0, 1920, 100, 0.5, 0.1);
        assert_eq!(run.levels.len(), 11);
        assert!((run.levels[0] - 0.5).abs() < 1e-12);
        assert!((run.levels[8] - 0.025).abs() < 1e-12);
        let data = run.build();
        assert_eq!(data.filters.len(), 11);
        assert_eq!(data.filters[3].position, TracePosition::Filter(4));
    }
}
