use std::path::Path;

use anyhow::{Context, Result, bail};

/// File name of the digitizer settings inside a run directory.
pub const SETTINGS_FILE: &str = "CMDataSettings.txt";

const PRESCALE_LINE: usize = 4;
const RECORD_LENGTH_LINE: usize = 5;

/// Digitizer settings a run was recorded with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionSettings {
    /// Integer down-sampling factor applied while recording.
    pub prescale: u32,
    /// Nominal record length, in seconds.
    pub record_length: f64,
}

impl AcquisitionSettings {
    pub fn load(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(SETTINGS_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text)
    }

    /// Parse the settings text. Values sit at fixed lines, as the second
    /// space-separated token.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let prescale: u32 = field(&lines, PRESCALE_LINE, "prescale")?
            .parse()
            .context("prescale is not an integer")?;
        let record_length: f64 = field(&lines, RECORD_LENGTH_LINE, "record length")?
            .parse()
            .context("record length is not a number")?;

        if prescale == 0 {
            bail!("prescale must be positive");
        }
        if !(record_length.is_finite() && record_length > 0.0) {
            bail!("record length must be positive, got {record_length}");
        }
        Ok(Self {
            prescale,
            record_length,
        })
    }

    /// Effective sample rate after prescaling.
    pub fn sample_rate(&self, adc_rate: f64) -> f64 {
        adc_rate / f64::from(self.prescale)
    }

    /// Number of samples every capture is trimmed to.
    pub fn sample_limit(&self, adc_rate: f64, length_fraction: f64) -> usize {
        (self.sample_rate(adc_rate) * self.record_length * length_fraction).floor() as usize
    }
}

fn field<'a>(lines: &[&'a str], index: usize, name: &str) -> Result<&'a str> {
    let line = lines
        .get(index)
        .with_context(|| format!("settings file has no line {} ({name})", index + 1))?;
    line.split(' ')
        .nth(1)
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .with_context(|| format!("settings line {} has no {name} value", index + 1))
}

/// Render settings in the layout [`AcquisitionSettings::parse`] reads.
pub fn render_settings(settings: &AcquisitionSettings) -> String {
    format!(
        "Channels 2\nTrigger none\nThreshold 0\nMode continuous\nPrescale {}\nRecordLength {}\n",
        settings.prescale, settings.record_length
    )
}
