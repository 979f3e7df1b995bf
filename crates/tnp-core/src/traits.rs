//! Core traits for tag-and-probe likelihood models.
//!
//! Fitters depend only on [`LogDensityModel`]; concrete models (the extended
//! signal+background bin model, test fixtures) implement it.

use crate::Result;

/// A parametric model exposing a negative log-likelihood over a box-constrained parameter space.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names (stable order).
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds `(low, high)`, used as L-BFGS-B box constraints.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Suggested starting point.
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood at `params`.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of the negative log-likelihood.
    ///
    /// Defaults to central finite differences with a step scaled to each parameter.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        let mut work = params.to_vec();
        for i in 0..params.len() {
            let eps = 1e-6 * params[i].abs().max(1.0);
            work[i] = params[i] + eps;
            let f_plus = self.nll(&work)?;
            work[i] = params[i] - eps;
            let f_minus = self.nll(&work)?;
            work[i] = params[i];
            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }
        Ok(grad)
    }

    /// Index of a parameter by name.
    fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names().iter().position(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Parabola;

    impl LogDensityModel for Parabola {
        fn dim(&self) -> usize {
            2
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["a".into(), "b".into()]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            vec![(-10.0, 10.0); 2]
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![0.0, 0.0]
        }

        fn nll(&self, params: &[f64]) -> Result<f64> {
            Ok((params[0] - 1.0).powi(2) + 3.0 * (params[1] + 2.0).powi(2))
        }
    }

    #[test]
    fn test_default_gradient_is_central_difference() {
        let g = Parabola.grad_nll(&[0.5, 0.0]).unwrap();
        assert_relative_eq!(g[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(g[1], 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_parameter_index() {
        assert_eq!(Parabola.parameter_index("b"), Some(1));
        assert_eq!(Parabola.parameter_index("c"), None);
    }
}
