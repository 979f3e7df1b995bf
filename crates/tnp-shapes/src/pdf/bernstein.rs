//! Bernstein-polynomial background over the observable range.

use super::{UnbinnedPdf, validate_len_and_finite};
use crate::math::{bernstein_monomial, binomial};
use tnp_core::{Error, Result};

/// Normalized Bernstein polynomial `Σ_i c_i C(n,i) t^i (1-t)^(n-i)`, `t = (x - a)/(b - a)`.
///
/// Shape parameters: `[c0, ..., cn]`. The normalization is exact: each basis polynomial
/// integrates to `(b - a)/(n + 1)`.
#[derive(Debug, Clone)]
pub struct BernsteinPdf {
    observables: [String; 1],
    degree: usize,
}

impl BernsteinPdf {
    /// Create a degree-`degree` polynomial (`degree + 1` coefficients).
    pub fn new(observable: impl Into<String>, degree: usize) -> Self {
        Self { observables: [observable.into()], degree }
    }

    /// Polynomial degree.
    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl UnbinnedPdf for BernsteinPdf {
    fn n_params(&self) -> usize {
        self.degree + 1
    }

    fn param_names(&self) -> Vec<String> {
        (0..=self.degree).map(|i| format!("c{i}")).collect()
    }

    fn observables(&self) -> &[String] {
        &self.observables
    }

    fn shape_value(&self, x: f64, params: &[f64], bounds: (f64, f64)) -> f64 {
        let (a, b) = bounds;
        let t = (x - a) / (b - a);
        let n = self.degree;
        if params.len() < n + 1 {
            return f64::NAN;
        }
        params[..=n]
            .iter()
            .enumerate()
            .map(|(i, &c)| c * binomial(n, i) * bernstein_monomial(t, i, n))
            .sum()
    }

    fn validate_params(&self, params: &[f64]) -> Result<()> {
        validate_len_and_finite("BernsteinPdf", self.n_params(), params)
    }

    fn log_normalization(&self, params: &[f64], bounds: (f64, f64)) -> Result<f64> {
        self.validate_params(params)?;
        let (a, b) = bounds;
        let z = (b - a) * params.iter().sum::<f64>() / (self.degree as f64 + 1.0);
        if !z.is_finite() || z <= 0.0 {
            return Err(Error::Computation(format!(
                "Bernstein normalization is not finite/positive: {z}"
            )));
        }
        Ok(z.ln())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{NormalizationConfig, integrate_piecewise};
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_coefficients_are_flat() {
        let pdf = BernsteinPdf::new("mass", 3);
        let c = [0.5; 4];
        for x in [60.0, 75.0, 100.0, 120.0] {
            assert_relative_eq!(pdf.shape_value(x, &c, (60.0, 120.0)), 0.5, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_analytic_normalization_matches_quadrature() {
        let pdf = BernsteinPdf::new("mass", 4);
        let c = [0.9, 0.1, 0.4, 0.7, 0.2];
        let bounds = (60.0, 120.0);
        let numeric = integrate_piecewise(
            |x| pdf.shape_value(x, &c, bounds),
            bounds,
            &[],
            &NormalizationConfig::default(),
        );
        let log_z = pdf.log_normalization(&c, bounds).unwrap();
        assert_relative_eq!(log_z.exp(), numeric, max_relative = 1e-12);
    }

    #[test]
    fn test_short_parameter_slice_is_nan() {
        let pdf = BernsteinPdf::new("mass", 2);
        assert!(pdf.shape_value(80.0, &[1.0, 1.0], (60.0, 120.0)).is_nan());
        assert!(pdf.shape_value(80.0, &[], (60.0, 120.0)).is_nan());
        assert!(pdf.shape_value(80.0, &[1.0; 3], (60.0, 120.0)).is_finite());
        assert!(pdf.log_normalization(&[1.0, 1.0], (60.0, 120.0)).is_err());
    }

    #[test]
    fn test_all_zero_coefficients_error() {
        let pdf = BernsteinPdf::new("mass", 2);
        assert!(pdf.log_normalization(&[0.0; 3], (0.0, 1.0)).is_err());
    }
}
