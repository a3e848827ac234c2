use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use arrow::array::{Array, Float32Array, Float64Array};
use arrow::datatypes::DataType;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::model::{Channel, PedestalMeasurement, RunData, TracePosition, WaveformCapture};
use super::settings::AcquisitionSettings;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, LengthShortfall, Result};

/// Extensions probed for each capture stem, in order.
pub const CAPTURE_EXTENSIONS: [&str; 3] = ["parquet", "csv", "json"];

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const PMT_COLUMN: &str = "pmt";
pub const PHOTODIODE_COLUMN: &str = "photodiode";

// ---------------------------------------------------------------------------
// Run directory
// ---------------------------------------------------------------------------

/// Every capture a run directory must contain: the recorded filter positions
/// followed by the two dark captures.
pub fn expected_positions(config: &AnalysisConfig) -> Vec<TracePosition> {
    (1..=config.recorded_positions)
        .map(TracePosition::Filter)
        .chain([TracePosition::PrePedestal, TracePosition::PostPedestal])
        .collect()
}

/// Find the capture file for a stem, whichever supported extension it has.
pub fn locate_capture(run_dir: &Path, stem: &str) -> Option<PathBuf> {
    CAPTURE_EXTENSIONS
        .iter()
        .map(|ext| run_dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Load and validate every capture of a run, trimmed to the common limit.
///
/// Fails before reading any data if a file is absent, then per capture if the
/// timestamp range or the sample count is too short.
pub fn load_run(
    run_dir: &Path,
    config: &AnalysisConfig,
    settings: &AcquisitionSettings,
) -> Result<RunData> {
    let positions = expected_positions(config);

    let mut located = Vec::with_capacity(positions.len());
    let mut missing = Vec::new();
    for pos in &positions {
        match locate_capture(run_dir, &pos.file_stem()) {
            Some(path) => located.push((*pos, path)),
            None => missing.push(pos.file_stem()),
        }
    }
    if !missing.is_empty() {
        return Err(AnalysisError::FileStructure { missing });
    }

    let limit = settings.sample_limit(config.adc_rate, config.length_fraction);
    debug!(
        "prescale={}, record_length={:.2}, sample limit={limit}",
        settings.prescale, settings.record_length
    );

    let mut filters = Vec::with_capacity(config.recorded_positions);
    let mut pre = None;
    let mut post = None;
    for (pos, path) in located {
        let mut capture = load_capture(&path, pos)?;
        validate_capture(&capture, limit, config.min_final_timestamp)?;
        capture.truncate(limit);
        match pos {
            TracePosition::Filter(_) => filters.push(capture),
            TracePosition::PrePedestal => pre = Some(capture),
            TracePosition::PostPedestal => post = Some(capture),
        }
    }

    let pre = pre.context("pre-pedestal capture was not loaded")?;
    let post = post.context("post-pedestal capture was not loaded")?;
    Ok(RunData {
        sample_rate: settings.sample_rate(config.adc_rate),
        filters,
        pedestal: PedestalMeasurement { pre, post },
    })
}

fn validate_capture(capture: &WaveformCapture, limit: usize, min_timestamp: f64) -> Result<()> {
    let label = capture.position.to_string();
    let last = capture.timestamp.last().copied().unwrap_or(f64::NAN);
    // NaN fails this comparison too
    if !(last > min_timestamp) {
        return Err(AnalysisError::DataLength {
            label,
            shortfall: LengthShortfall::Timestamp {
                last,
                bound: min_timestamp,
            },
        });
    }
    if capture.len() < limit {
        return Err(AnalysisError::DataLength {
            label,
            shortfall: LengthShortfall::Samples {
                len: capture.len(),
                limit,
            },
        });
    }
    // only the samples kept after trimming matter
    for channel in [Channel::Pmt, Channel::Photodiode] {
        let samples = &capture.channel(channel)[..limit];
        if let Some(i) = samples.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::Load(anyhow!(
                "trace {label}: {channel} sample {i} is {}",
                samples[i]
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single capture – dispatch by extension
// ---------------------------------------------------------------------------

/// Load one waveform capture from a file.
///
/// Supported formats:
/// * `.parquet` – `timestamp`, `pmt`, `photodiode` Float64/Float32 columns
/// * `.csv`     – header row with the same three columns, one sample per row
/// * `.json`    – `{ "timestamp": [...], "pmt": [...], "photodiode": [...] }`
pub fn load_capture(path: &Path, position: TracePosition) -> anyhow::Result<WaveformCapture> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let record = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    debug!("{position}: {} samples from {}", record.pmt.len(), path.display());
    Ok(record.into_capture(position))
}

/// Column-oriented layout shared by the JSON format and the writers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub timestamp: Vec<f64>,
    pub pmt: Vec<f64>,
    pub photodiode: Vec<f64>,
}

impl CaptureRecord {
    fn into_capture(self, position: TracePosition) -> WaveformCapture {
        WaveformCapture {
            position,
            timestamp: self.timestamp,
            pmt: self.pmt,
            photodiode: self.photodiode,
        }
    }
}

impl From<&WaveformCapture> for CaptureRecord {
    fn from(capture: &WaveformCapture) -> Self {
        Self {
            timestamp: capture.timestamp.clone(),
            pmt: capture.pmt.clone(),
            photodiode: capture.photodiode.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

fn load_json(path: &Path) -> anyhow::Result<CaptureRecord> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let record: CaptureRecord = serde_json::from_str(&text).context("parsing JSON")?;
    check_lengths(&record)?;
    Ok(record)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SampleRow {
    timestamp: f64,
    pmt: f64,
    photodiode: f64,
}

fn load_csv(path: &Path) -> anyhow::Result<CaptureRecord> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let mut record = CaptureRecord::default();

    for (row_no, result) in reader.deserialize::<SampleRow>().enumerate() {
        let row = result.with_context(|| format!("CSV row {row_no}"))?;
        record.timestamp.push(row.timestamp);
        record.pmt.push(row.pmt);
        record.photodiode.push(row.photodiode);
    }
    Ok(record)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

fn load_parquet(path: &Path) -> anyhow::Result<CaptureRecord> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut record = CaptureRecord::default();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        for (name, target) in [
            (TIMESTAMP_COLUMN, &mut record.timestamp),
            (PMT_COLUMN, &mut record.pmt),
            (PHOTODIODE_COLUMN, &mut record.photodiode),
        ] {
            let idx = schema
                .index_of(name)
                .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
            extend_f64(batch.column(idx), target)
                .with_context(|| format!("reading '{name}' column"))?;
        }
    }
    check_lengths(&record)?;
    Ok(record)
}

/// Append a Float64 or Float32 column to `out`; nulls become NaN.
fn extend_f64(col: &Arc<dyn Array>, out: &mut Vec<f64>) -> anyhow::Result<()> {
    match col.data_type() {
        DataType::Float64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array")?;
            out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
        DataType::Float32 => {
            let arr = col
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("expected Float32Array")?;
            out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
        }
        other => bail!("Expected Float64 or Float32 column, got {other:?}"),
    }
    Ok(())
}

fn check_lengths(record: &CaptureRecord) -> anyhow::Result<()> {
    let n = record.timestamp.len();
    if record.pmt.len() != n || record.photodiode.len() != n {
        bail!(
            "channel lengths differ: timestamp {n}, pmt {}, photodiode {}",
            record.pmt.len(),
            record.photodiode.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::writer::write_capture;
    use tempfile::TempDir;

    fn capture(position: TracePosition, n: usize) -> WaveformCapture {
        WaveformCapture {
            position,
            timestamp: (0..n).map(|i| i as f64).collect(),
            pmt: (0..n).map(|i| (i % 7) as f64 * 0.25).collect(),
            photodiode: vec![0.5; n],
        }
    }

    #[test]
    fn every_format_loads_back() {
        let dir = TempDir::new().unwrap();
        let original = capture(TracePosition::Filter(2), 256);
        for ext in CAPTURE_EXTENSIONS {
            let path = dir.path().join(format!("2.{ext}"));
            write_capture(&path, &original).unwrap();
            let loaded = load_capture(&path, TracePosition::Filter(2)).unwrap();
            assert_eq!(loaded, original, "format {ext}");
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.root");
        std::fs::write(&path, b"").unwrap();
        assert!(load_capture(&path, TracePosition::Filter(1)).is_err());
    }

    #[test]
    fn expected_layout_has_dark_captures_last() {
        let stems: Vec<String> = expected_positions(&AnalysisConfig::default())
            .iter()
            .map(|p| p.file_stem())
            .collect();
        assert_eq!(stems.len(), 13);
        assert_eq!(stems[0], "1");
        assert_eq!(stems[10], "11");
        assert_eq!(&stems[11..], ["12-0", "12-1"]);
    }

    #[test]
    fn missing_files_are_listed() {
        let dir = TempDir::new().unwrap();
        let config = AnalysisConfig::default();
        for pos in expected_positions(&config) {
            if pos != TracePosition::Filter(4) && pos != TracePosition::PostPedestal {
                let path = dir.path().join(format!("{}.json", pos.file_stem()));
                write_capture(&path, &capture(pos, 16)).unwrap();
            }
        }
        let settings = AcquisitionSettings {
            prescale: 1,
            record_length: 1e-6,
        };
        match load_run(dir.path(), &config, &settings) {
            Err(AnalysisError::FileStructure { missing }) => {
                assert_eq!(missing, vec!["4".to_string(), "12-1".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_capture_fails_length_check() {
        let cap = capture(TracePosition::Filter(1), 500);
        let err = validate_capture(&cap, 1000, 100.0).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::DataLength {
                shortfall: LengthShortfall::Samples { len: 500, limit: 1000 },
                ..
            }
        ));
    }

    #[test]
    fn short_timestamp_range_fails() {
        let cap = capture(TracePosition::Filter(1), 50);
        let err = validate_capture(&cap, 10, 100.0).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::DataLength {
                shortfall: LengthShortfall::Timestamp { .. },
                ..
            }
        ));
    }

    #[test]
    fn non_finite_sample_is_named() {
        let mut cap = capture(TracePosition::Filter(1), 500);
        cap.pmt[123] = f64::NAN;
        let err = validate_capture(&cap, 400, 100.0).unwrap_err();
        assert!(matches!(err, AnalysisError::Load(_)));
        let message = err.to_string();
        assert!(message.contains("F1"), "{message}");
        assert!(message.contains("pmt sample 123"), "{message}");
    }

    #[test]
    fn non_finite_sample_past_the_limit_is_trimmed_away() {
        let mut cap = capture(TracePosition::Filter(1), 500);
        cap.photodiode[450] = f64::INFINITY;
        assert!(validate_capture(&cap, 400, 100.0).is_ok());
        cap.photodiode[10] = f64::NEG_INFINITY;
        assert!(validate_capture(&cap, 400, 100.0).is_err());
    }
}
