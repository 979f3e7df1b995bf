//! Fit result types.

use serde::{Deserialize, Serialize};

/// Outcome of a maximum-likelihood fit: estimates, uncertainties and fit quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Parameter names, aligned with `parameters`.
    pub parameter_names: Vec<String>,

    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal)
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if Hessian inversion failed.
    pub covariance: Option<Vec<f64>>,

    /// Negative log-likelihood at minimum
    pub nll: f64,

    /// Convergence status
    pub converged: bool,

    /// Optimizer iterations
    pub n_iter: usize,

    /// Number of objective evaluations
    pub n_fev: usize,

    /// Number of gradient evaluations
    pub n_gev: usize,

    /// Optimizer termination message
    #[serde(default)]
    pub message: String,

    /// Identifiability / quality warnings collected after the fit.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FitResult {
    /// Create a fit result without covariance.
    pub fn new(
        parameter_names: Vec<String>,
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        nll: f64,
        converged: bool,
    ) -> Self {
        Self {
            parameter_names,
            parameters,
            uncertainties,
            covariance: None,
            nll,
            converged,
            n_iter: 0,
            n_fev: 0,
            n_gev: 0,
            message: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Attach a row-major covariance matrix.
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Self {
        self.covariance = Some(covariance);
        self
    }

    /// Attach optimizer counters and termination message.
    pub fn with_counts(mut self, n_iter: usize, n_fev: usize, n_gev: usize, message: String) -> Self {
        self.n_iter = n_iter;
        self.n_fev = n_fev;
        self.n_gev = n_gev;
        self.message = message;
        self
    }

    /// Index of a named parameter.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }

    /// Best-fit value of a named parameter.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.index_of(name).and_then(|i| self.parameters.get(i).copied())
    }

    /// Uncertainty of a named parameter.
    pub fn uncertainty(&self, name: &str) -> Option<f64> {
        self.index_of(name).and_then(|i| self.uncertainties.get(i).copied())
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.parameters.len();
        if i >= n || j >= n {
            return None;
        }
        let sigma_i = self.uncertainties[i];
        let sigma_j = self.uncertainties[j];
        if sigma_i <= 0.0 || sigma_j <= 0.0 {
            return None;
        }
        Some(cov[i * n + j] / (sigma_i * sigma_j))
    }
}
