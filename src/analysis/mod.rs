/// Analysis layer: from pedestal-corrected waveforms to a non-linearity figure.
///
/// ```text
///   RunData ──► pedestal ──► quality (levels)
///                  │
///                  ▼
///               edges ──► quality (periods)
///                  │
///                  ▼
///               pairs ──► asymmetry ──► FilterResult[1..9]
///                                            │
///                         current ◄──────────┤
///                                            ▼
///                                        linearity ──► LinearityFitResult
/// ```

pub mod asymmetry;
pub mod current;
pub mod edges;
pub mod linearity;
pub mod pairs;
pub mod pedestal;
pub mod quality;
pub mod uncertainty;

// ---------------------------------------------------------------------------
// Shared statistics
// ---------------------------------------------------------------------------

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Standard error of the mean, `std / sqrt(n)`.
pub fn sem(values: &[f64]) -> f64 {
    std_dev(values) / (values.len() as f64).sqrt()
}
