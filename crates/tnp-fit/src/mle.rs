//! Maximum-likelihood estimation with Hessian-based uncertainties.

use crate::optimizer::{BoundedLbfgs, FreeSubspace, Minimum, OptimizerConfig};
use nalgebra::DMatrix;
use tnp_core::traits::LogDensityModel;
use tnp_core::{Error, FitResult, Result};

/// Check for identifiability issues based on the Hessian and uncertainties.
///
/// Returns human-readable warnings (empty if the model is well identified).
pub fn identifiability_warnings(
    hessian: &DMatrix<f64>,
    param_names: &[String],
    uncertainties: &[f64],
    bounds: &[(f64, f64)],
) -> Vec<String> {
    let n = hessian.nrows();
    let mut warnings = Vec::new();

    let free: Vec<usize> = (0..n).filter(|&i| bounds.get(i).is_none_or(|b| b.0 < b.1)).collect();

    // Condition number over the free block.
    if !free.is_empty() {
        let sub = DMatrix::from_fn(free.len(), free.len(), |r, c| hessian[(free[r], free[c])]);
        let svals = sub.svd(false, false).singular_values;
        let s_max = svals.iter().fold(0.0_f64, |a, &b| a.max(b));
        let s_min = svals.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        if s_min > 0.0 {
            let cond = s_max / s_min;
            if cond > 1e8 {
                warnings.push(format!(
                    "Hessian condition number = {cond:.1e}: model may be poorly identified"
                ));
            }
        } else {
            warnings.push("Hessian is singular: model is not identifiable".into());
        }
    }

    for &i in &free {
        let name = param_names.get(i).map(String::as_str).unwrap_or("?");
        if let Some(u) = uncertainties.get(i)
            && !u.is_finite()
        {
            warnings.push(format!("Parameter '{name}': uncertainty is {u}"));
        }
        if hessian[(i, i)].abs() < 1e-12 {
            warnings.push(format!("Parameter '{name}': near-zero Hessian diagonal, not identifiable"));
        }
    }

    warnings
}

/// Maximum Likelihood Estimator
///
/// Fits models by minimizing the negative log-likelihood.
#[derive(Debug, Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    config: OptimizerConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create an MLE with the default optimizer configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an MLE with a custom optimizer configuration.
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Access the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit any [`LogDensityModel`] from its initial values.
    pub fn fit<M: LogDensityModel + ?Sized>(&self, model: &M) -> Result<FitResult> {
        self.fit_from(model, &model.parameter_init())
    }

    /// Fit from an explicit starting point, with covariance and uncertainties.
    ///
    /// Fixed parameters (`low == high`) are excluded from the Hessian; their uncertainty is 0.
    pub fn fit_from<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<FitResult> {
        log::debug!("MLE fit: {} parameters", model.dim());
        let result = self.fit_minimum_from(model, initial_params)?;
        log::debug!(
            "MLE fit: nll={:.6}, n_iter={}, n_fev={}, converged={}",
            result.nll,
            result.n_iter,
            result.n_fev,
            result.converged
        );

        let bounds = model.parameter_bounds();
        let names = model.parameter_names();
        let n = result.parameters.len();
        let space = FreeSubspace::new(&result.parameters, &bounds)?;
        let free = space.free_indices();

        let hessian = self.compute_hessian(model, &result.parameters, free)?;
        let diag_uncertainties = self.diagonal_uncertainties(&hessian);
        let mut uncertainties = vec![0.0; n];
        let mut covariance: Option<Vec<f64>> = None;

        match self.invert_hessian(&hessian) {
            Some(cov) => {
                let mut all_variances_ok = true;
                for (k, &i) in free.iter().enumerate() {
                    let var = cov[(k, k)];
                    if var.is_finite() && var > 0.0 {
                        uncertainties[i] = var.sqrt();
                    } else {
                        all_variances_ok = false;
                        uncertainties[i] = diag_uncertainties[k];
                    }
                }
                if all_variances_ok {
                    let mut flat = vec![0.0; n * n];
                    for (a, &i) in free.iter().enumerate() {
                        for (b, &j) in free.iter().enumerate() {
                            flat[i * n + j] = cov[(a, b)];
                        }
                    }
                    covariance = Some(flat);
                } else {
                    log::warn!("Invalid covariance diagonal; omitting covariance matrix");
                }
            }
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                for (k, &i) in free.iter().enumerate() {
                    uncertainties[i] = diag_uncertainties[k];
                }
            }
        }

        let mut full_hessian = DMatrix::zeros(n, n);
        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate() {
                full_hessian[(i, j)] = hessian[(a, b)];
            }
        }
        let warnings = identifiability_warnings(&full_hessian, &names, &uncertainties, &bounds);
        for w in &warnings {
            log::warn!("{w}");
        }

        let mut fr =
            FitResult::new(names, result.parameters, uncertainties, result.nll, result.converged)
                .with_counts(result.n_iter as usize, result.n_fev, result.n_gev, result.message);
        if let Some(cov) = covariance {
            fr = fr.with_covariance(cov);
        }
        fr.warnings = warnings;
        Ok(fr)
    }

    /// Minimize the NLL from an explicit starting point, without uncertainties.
    pub fn fit_minimum_from<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<Minimum> {
        if initial_params.len() != model.dim() {
            return Err(Error::Validation(format!(
                "fit_minimum_from: initial_params length {} != model.dim() {}",
                initial_params.len(),
                model.dim()
            )));
        }
        BoundedLbfgs::new(self.config.clone()).minimize(model, initial_params)
    }

    /// Hessian of the NLL over the `free` parameters by forward differences of the gradient.
    fn compute_hessian<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        best_params: &[f64],
        free: &[usize],
    ) -> Result<DMatrix<f64>> {
        let n = free.len();
        let grad_center = model.grad_nll(best_params)?;
        let bounds = model.parameter_bounds();

        let mut hessian = DMatrix::zeros(n, n);
        let mut probe = best_params.to_vec();
        for (col, &j) in free.iter().enumerate() {
            // Step inward when sitting on the upper bound.
            let mut eps = 1e-4 * best_params[j].abs().max(1.0);
            if best_params[j] + eps > bounds[j].1 {
                eps = -eps;
            }
            probe[j] = best_params[j] + eps;
            let grad_plus = model.grad_nll(&probe)?;
            probe[j] = best_params[j];

            for (row, &i) in free.iter().enumerate() {
                hessian[(row, col)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        let ht = hessian.transpose();
        Ok((&hessian + &ht) * 0.5)
    }

    /// Covariance by damped Cholesky inversion; `None` if no positive-definite inverse exists.
    fn invert_hessian(&self, hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let n = hessian.nrows();
        let identity = DMatrix::identity(n, n);

        // Damping is scaled to the largest diagonal entry.
        let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

        let mut h_damped = hessian.clone();
        let mut damping = 0.0_f64;
        let max_attempts = 10;

        for attempt in 0..max_attempts {
            if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
                return Some(chol.solve(&identity));
            }
            if attempt + 1 == max_attempts {
                break;
            }
            let next_damping = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
            let add = next_damping - damping;
            for i in 0..n {
                h_damped[(i, i)] += add;
            }
            damping = next_damping;
        }

        let cov = h_damped.lu().try_inverse()?;
        for i in 0..n {
            let v = cov[(i, i)];
            if !(v.is_finite() && v > 0.0) {
                return None;
            }
        }
        Some(cov)
    }

    /// Uncertainties from the Hessian diagonal (fallback).
    fn diagonal_uncertainties(&self, hessian: &DMatrix<f64>) -> Vec<f64> {
        (0..hessian.nrows()).map(|i| 1.0 / hessian[(i, i)].abs().max(1e-12).sqrt()).collect()
    }

    /// Run independent fits in parallel using Rayon. One result per model, in order.
    pub fn fit_batch<M: LogDensityModel>(&self, models: &[M]) -> Vec<Result<FitResult>> {
        use rayon::prelude::*;

        models.par_iter().map(|model| self.fit(model)).collect()
    }
}
