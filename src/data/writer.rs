use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::Float64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use super::loader::{CaptureRecord, PHOTODIODE_COLUMN, PMT_COLUMN, TIMESTAMP_COLUMN};
use super::model::WaveformCapture;

/// Write a capture in the format chosen by the file extension.
pub fn write_capture(path: &Path, capture: &WaveformCapture) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => write_parquet(path, capture),
        "json" => write_json(path, capture),
        "csv" => write_csv(path, capture),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("writing {}", path.display()))
}

fn write_json(path: &Path, capture: &WaveformCapture) -> Result<()> {
    let text = serde_json::to_string(&CaptureRecord::from(capture)).context("encoding JSON")?;
    std::fs::write(path, text).context("writing JSON file")
}

#[derive(Serialize)]
struct SampleRow {
    timestamp: f64,
    pmt: f64,
    photodiode: f64,
}

fn write_csv(path: &Path, capture: &WaveformCapture) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    for i in 0..capture.len() {
        writer.serialize(SampleRow {
            timestamp: capture.timestamp[i],
            pmt: capture.pmt[i],
            photodiode: capture.photodiode[i],
        })?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn write_parquet(path: &Path, capture: &WaveformCapture) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(TIMESTAMP_COLUMN, DataType::Float64, false),
        Field::new(PMT_COLUMN, DataType::Float64, false),
        Field::new(PHOTODIODE_COLUMN, DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(capture.timestamp.clone())),
            Arc::new(Float64Array::from(capture.pmt.clone())),
            Arc::new(Float64Array::from(capture.photodiode.clone())),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
