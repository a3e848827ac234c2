//! Linearity quantification.
//!
//! An ideal PMT gives the same asymmetry at every light level, so the fitted
//! slope of asymmetry against current, relative to the intercept and scaled by
//! the largest current, measures the deviation from linear response.

use log::debug;

use super::uncertainty::Measured;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Weighted least squares
// ---------------------------------------------------------------------------

/// Straight-line fit `y = intercept + slope * x` with absolute y uncertainties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub intercept_err: f64,
    pub slope: f64,
    pub slope_err: f64,
    /// `Σ((y - fit) / y_err)²`
    pub chi_square: f64,
    pub ndf: usize,
}

fn weights(y_err: &[f64]) -> Result<Vec<f64>> {
    y_err
        .iter()
        .enumerate()
        .map(|(i, &e)| {
            if e.is_finite() && e > 0.0 {
                Ok(1.0 / (e * e))
            } else {
                Err(AnalysisError::Fit(format!(
                    "point {i} has unusable uncertainty {e}"
                )))
            }
        })
        .collect()
}

fn check_finite(name: &str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(AnalysisError::Fit(format!("{name}[{i}] is not finite"))),
        None => Ok(()),
    }
}

/// Chi-square minimizing straight line through `(x, y ± y_err)`.
pub fn fit_linear(x: &[f64], y: &[f64], y_err: &[f64]) -> Result<LinearFit> {
    if x.len() != y.len() || y.len() != y_err.len() {
        return Err(AnalysisError::Fit(format!(
            "length mismatch: x {}, y {}, y_err {}",
            x.len(),
            y.len(),
            y_err.len()
        )));
    }
    if x.len() < 2 {
        return Err(AnalysisError::Fit(format!(
            "{} points cannot constrain a line",
            x.len()
        )));
    }
    check_finite("x", x)?;
    check_finite("y", y)?;
    let w = weights(y_err)?;

    let (mut s, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for ((&xi, &yi), &wi) in x.iter().zip(y).zip(&w) {
        s += wi;
        sx += wi * xi;
        sy += wi * yi;
        sxx += wi * xi * xi;
        sxy += wi * xi * yi;
    }
    let delta = s * sxx - sx * sx;
    if !(delta.is_finite() && delta > 0.0) {
        return Err(AnalysisError::Fit(
            "normal equations are singular (all x equal?)".to_string(),
        ));
    }

    let intercept = (sxx * sy - sx * sxy) / delta;
    let slope = (s * sxy - sx * sy) / delta;
    let chi_square = x
        .iter()
        .zip(y)
        .zip(y_err)
        .map(|((&xi, &yi), &ei)| ((yi - (intercept + slope * xi)) / ei).powi(2))
        .sum();

    Ok(LinearFit {
        intercept,
        intercept_err: (sxx / delta).sqrt(),
        slope,
        slope_err: (s / delta).sqrt(),
        chi_square,
        ndf: x.len() - 2,
    })
}

/// Weighted mean, i.e. the chi-square fit of a constant.
pub fn fit_constant(y: &[f64], y_err: &[f64]) -> Result<Measured> {
    if y.len() != y_err.len() || y.is_empty() {
        return Err(AnalysisError::Fit(format!(
            "constant fit needs matching, non-empty inputs (y {}, y_err {})",
            y.len(),
            y_err.len()
        )));
    }
    check_finite("y", y)?;
    let w = weights(y_err)?;
    let sw: f64 = w.iter().sum();
    let swy: f64 = w.iter().zip(y).map(|(wi, yi)| wi * yi).sum();
    Ok(Measured::new(swy / sw, (1.0 / sw).sqrt()))
}

// ---------------------------------------------------------------------------
// Local sensitivity
// ---------------------------------------------------------------------------

/// Finite-difference `dA/dI` between two adjacent filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityPoint {
    /// Midpoint of the two currents.
    pub current: f64,
    pub dadi: f64,
    pub dadi_err: f64,
}

/// `dA/dI` for every adjacent pair of points. Component uncertainties of each
/// difference are summed before the quotient rule is applied.
pub fn local_sensitivity(x: &[Measured], y: &[Measured]) -> Vec<SensitivityPoint> {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| {
            let da = Measured::new(ys[1].value - ys[0].value, ys[1].err + ys[0].err);
            let di = Measured::new(xs[1].value - xs[0].value, xs[1].err + xs[0].err);
            let dadi = da / di;
            SensitivityPoint {
                current: (xs[0].value + xs[1].value) / 2.0,
                dadi: dadi.value,
                dadi_err: dadi.err,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// LinearityFitResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LinearityFitResult {
    pub fit: LinearFit,
    /// `slope / intercept × max(current)`, in percent.
    pub non_linearity_pct: f64,
    pub non_linearity_err_pct: f64,
    pub sensitivity: Vec<SensitivityPoint>,
    /// Constant fit over `sensitivity`.
    pub mean_sensitivity: f64,
    pub mean_sensitivity_err: f64,
}

/// Fit asymmetry against current and derive the non-linearity figures.
pub fn quantify(current: &[Measured], asymmetry: &[Measured]) -> Result<LinearityFitResult> {
    let x: Vec<f64> = current.iter().map(|m| m.value).collect();
    let y: Vec<f64> = asymmetry.iter().map(|m| m.value).collect();
    let y_err: Vec<f64> = asymmetry.iter().map(|m| m.err).collect();
    let fit = fit_linear(&x, &y, &y_err)?;
    debug!(
        "slope = {:.5} ± {:.5}, intercept = {:.4} ± {:.4}",
        fit.slope, fit.slope_err, fit.intercept, fit.intercept_err
    );

    let brightest = current
        .iter()
        .copied()
        .max_by(|a, b| a.value.total_cmp(&b.value))
        .ok_or_else(|| AnalysisError::Fit("no current values".to_string()))?;

    let relative_slope =
        Measured::new(fit.slope, fit.slope_err) / Measured::new(fit.intercept, fit.intercept_err);
    let lin = relative_slope * brightest;

    let sensitivity = local_sensitivity(current, asymmetry);
    let dadi: Vec<f64> = sensitivity.iter().map(|p| p.dadi).collect();
    let dadi_err: Vec<f64> = sensitivity.iter().map(|p| p.dadi_err).collect();
    let mean = fit_constant(&dadi, &dadi_err)?;

    Ok(LinearityFitResult {
        fit,
        non_linearity_pct: lin.value * 100.0,
        non_linearity_err_pct: lin.err * 100.0,
        sensitivity,
        mean_sensitivity: mean.value,
        mean_sensitivity_err: mean.err,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn exact_line_is_recovered() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 0.1 + 0.02 * v).collect();
        let fit = fit_linear(&x, &y, &[0.01; 5]).unwrap();
        assert_relative_eq!(fit.intercept, 0.1, epsilon = 1e-12);
        assert_relative_eq!(fit.slope, 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.chi_square, 0.0, epsilon = 1e-18);
        assert_eq!(fit.ndf, 3);
    }

    #[test]
    fn parameter_errors_follow_weights() {
        // two points, unit errors: slope error sqrt(2)/|dx|
        let fit = fit_linear(&[0.0, 2.0], &[1.0, 3.0], &[1.0, 1.0]).unwrap();
        assert_relative_eq!(fit.slope, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.slope_err, 2f64.sqrt() / 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept_err, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_uncertainty_is_a_fit_failure() {
        let err = fit_linear(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], &[0.1, 0.0, 0.1]).unwrap_err();
        assert!(matches!(err, AnalysisError::Fit(_)));
        assert!(fit_linear(&[2.0, 2.0], &[1.0, 3.0], &[1.0, 1.0]).is_err());
    }

    #[test]
    fn constant_fit_is_weighted_mean() {
        let m = fit_constant(&[1.0, 3.0], &[1.0, 1.0]).unwrap();
        assert_relative_eq!(m.value, 2.0);
        assert_relative_eq!(m.err, 0.5f64.sqrt(), epsilon = 1e-12);
        let m = fit_constant(&[1.0, 3.0], &[1.0, 1e6]).unwrap();
        assert_relative_eq!(m.value, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn noiseless_line_gives_zero_chi_square_and_scaled_slope() {
        let a = 0.1;
        let b = 0.002;
        let x: Vec<Measured> = [5.0, 4.0, 3.15, 2.5, 2.0, 1.6, 1.25, 0.5, 0.25]
            .iter()
            .map(|&v| Measured::new(v, 0.01))
            .collect();
        let y: Vec<Measured> = x
            .iter()
            .map(|m| Measured::new(a + b * m.value, 1e-4))
            .collect();
        let r = quantify(&x, &y).unwrap();
        assert_abs_diff_eq!(r.fit.chi_square, 0.0, epsilon = 1e-12);
        assert_eq!(r.fit.ndf, 7);
        assert_relative_eq!(r.non_linearity_pct, b / a * 5.0 * 100.0, max_relative = 1e-9);
        assert_eq!(r.sensitivity.len(), 8);
        assert_relative_eq!(r.mean_sensitivity, b, max_relative = 1e-9);
    }

    #[test]
    fn flat_response_is_linear() {
        let x: Vec<Measured> = [5.0, 4.0, 3.0, 2.0, 1.0]
            .iter()
            .map(|&v| Measured::new(v, 0.01))
            .collect();
        let y: Vec<Measured> = x.iter().map(|_| Measured::new(0.1, 1e-4)).collect();
        let r = quantify(&x, &y).unwrap();
        assert_abs_diff_eq!(r.non_linearity_pct, 0.0, epsilon = 1e-9);
        assert!(r.non_linearity_err_pct.is_finite());
        assert!(r.non_linearity_err_pct > 0.0);
        assert_abs_diff_eq!(r.mean_sensitivity, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn sensitivity_sums_component_errors() {
        let x = [Measured::new(1.0, 0.1), Measured::new(3.0, 0.1)];
        let y = [Measured::new(0.10, 0.01), Measured::new(0.14, 0.01)];
        let s = local_sensitivity(&x, &y);
        assert_eq!(s.len(), 1);
        assert_relative_eq!(s[0].current, 2.0);
        assert_relative_eq!(s[0].dadi, 0.02, epsilon = 1e-12);
        let expected = 0.02 * ((0.02f64 / 0.04).powi(2) + (0.2f64 / 2.0).powi(2)).sqrt();
        assert_relative_eq!(s[0].dadi_err, expected, max_relative = 1e-9);
    }
}
