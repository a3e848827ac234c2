//! First-order propagation of uncorrelated uncertainties.
//!
//! For `r = a / b` or `r = a * b` the relative uncertainties add in
//! quadrature: `δr = |r| * sqrt((δa/a)² + (δb/b)²)`. The expressions below are
//! that rule multiplied out, which keeps a finite limit when `a` is zero.
//! A denominator near zero still makes the result meaningless.

/// A value with its standard uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measured {
    pub value: f64,
    pub err: f64,
}

impl Measured {
    pub fn new(value: f64, err: f64) -> Self {
        Self { value, err }
    }
}

/// `(n / d, δ)` for `n ± nr` divided by `d ± dr`.
pub fn division_with_uncertainty(n: f64, nr: f64, d: f64, dr: f64) -> (f64, f64) {
    let value = n / d;
    let err = ((nr / d).powi(2) + (n * dr / (d * d)).powi(2)).sqrt();
    (value, err.abs())
}

/// `(n * d, δ)` for `n ± nr` times `d ± dr`.
pub fn multiplication_with_uncertainty(n: f64, nr: f64, d: f64, dr: f64) -> (f64, f64) {
    let value = n * d;
    let err = ((nr * d).powi(2) + (n * dr).powi(2)).sqrt();
    (value, err.abs())
}

impl std::ops::Div for Measured {
    type Output = Measured;

    fn div(self, rhs: Measured) -> Measured {
        let (value, err) = division_with_uncertainty(self.value, self.err, rhs.value, rhs.err);
        Measured { value, err }
    }
}

impl std::ops::Mul for Measured {
    type Output = Measured;

    fn mul(self, rhs: Measured) -> Measured {
        let (value, err) =
            multiplication_with_uncertainty(self.value, self.err, rhs.value, rhs.err);
        Measured { value, err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quadrature(a: f64, da: f64, b: f64, db: f64, r: f64) -> f64 {
        (((da / a).powi(2) + (db / b).powi(2)).sqrt() * r).abs()
    }

    #[test]
    fn division_reference_value() {
        let (v, e) = division_with_uncertainty(10.0, 1.0, 5.0, 0.5);
        assert_relative_eq!(v, 2.0);
        assert_relative_eq!(e, 2.0 * (0.1f64.powi(2) + 0.1f64.powi(2)).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn matches_relative_quadrature_rule() {
        for &(a, da, b, db) in &[(3.0, 0.2, -7.0, 0.4), (-0.5, 0.01, 2.5, 0.3), (1e-3, 1e-4, 4.0, 0.1)] {
            let (q, dq) = division_with_uncertainty(a, da, b, db);
            assert_relative_eq!(dq, quadrature(a, da, b, db, q), max_relative = 1e-12);
            let (p, dp) = multiplication_with_uncertainty(a, da, b, db);
            assert_relative_eq!(dp, quadrature(a, da, b, db, p), max_relative = 1e-12);
        }
    }

    #[test]
    fn zero_numerator_keeps_finite_uncertainty() {
        let (v, e) = division_with_uncertainty(0.0, 0.3, 2.0, 0.1);
        assert_eq!(v, 0.0);
        assert_relative_eq!(e, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn operators_propagate() {
        let r = Measured::new(6.0, 0.6) * Measured::new(2.0, 0.2);
        assert_relative_eq!(r.value, 12.0);
        assert_relative_eq!(r.err, 12.0 * 0.02f64.sqrt(), epsilon = 1e-12);
        let q = Measured::new(6.0, 0.6) / Measured::new(2.0, 0.2);
        assert_relative_eq!(q.value, 3.0);
        assert_relative_eq!(q.err, 3.0 * 0.02f64.sqrt(), epsilon = 1e-12);
    }
}
