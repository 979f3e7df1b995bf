//! Extended signal + background likelihood for one tag-and-probe bin.

use rayon::prelude::*;
use std::sync::Arc;
use tnp_core::traits::LogDensityModel;
use tnp_core::{Error, Result};
use tnp_shapes::math::logsumexp;
use tnp_shapes::{EventStore, UnbinnedPdf};

/// A model parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Stable parameter name.
    pub name: String,
    /// Initial value.
    pub init: f64,
    /// Bounds `(low, high)`; a fixed parameter has `low == high`.
    pub bounds: (f64, f64),
}

impl Parameter {
    /// Free parameter.
    pub fn new(name: impl Into<String>, init: f64, bounds: (f64, f64)) -> Self {
        Self { name: name.into(), init, bounds }
    }

    /// Parameter held constant at `value`.
    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self { name: name.into(), init: value, bounds: (value, value) }
    }
}

/// One component (signal or background) of the mixture.
#[derive(Clone)]
pub struct Process {
    /// Process name.
    pub name: String,
    /// Normalized shape.
    pub pdf: Arc<dyn UnbinnedPdf>,
    /// Global parameter indices used as the shape parameters, in `pdf.param_names()` order.
    pub shape_param_indices: Vec<usize>,
    /// Global index of the expected-event-count parameter.
    pub yield_index: usize,
}

/// Extended unbinned (or weighted, for histograms) mixture model:
///
/// `nll = Σ_p ν_p − Σ_i w_i log(Σ_p ν_p p_p(x_i))`
#[derive(Clone)]
pub struct TnpBinModel {
    parameters: Vec<Parameter>,
    data: Arc<EventStore>,
    processes: Vec<Process>,
}

impl TnpBinModel {
    /// Create a model; validates parameters and process wiring.
    pub fn new(
        parameters: Vec<Parameter>,
        data: Arc<EventStore>,
        processes: Vec<Process>,
    ) -> Result<Self> {
        if parameters.is_empty() {
            return Err(Error::Validation("TnpBinModel requires at least one parameter".into()));
        }
        if processes.is_empty() {
            return Err(Error::Validation("TnpBinModel requires at least one process".into()));
        }
        if data.n_events() == 0 {
            return Err(Error::Validation("TnpBinModel requires non-empty data".into()));
        }

        for p in &parameters {
            if !p.init.is_finite() {
                return Err(Error::Validation(format!(
                    "parameter '{}' init is not finite",
                    p.name
                )));
            }
            if p.bounds.0.is_nan() || p.bounds.1.is_nan() || p.bounds.0 > p.bounds.1 {
                return Err(Error::Validation(format!(
                    "parameter '{}' has invalid bounds {:?}",
                    p.name, p.bounds
                )));
            }
            if p.init < p.bounds.0 || p.init > p.bounds.1 {
                return Err(Error::Validation(format!(
                    "parameter '{}' init {} outside bounds {:?}",
                    p.name, p.init, p.bounds
                )));
            }
        }

        for proc in &processes {
            if proc.shape_param_indices.len() != proc.pdf.n_params() {
                return Err(Error::Validation(format!(
                    "process '{}' shape_param_indices length {} != pdf.n_params() {}",
                    proc.name,
                    proc.shape_param_indices.len(),
                    proc.pdf.n_params()
                )));
            }
            let all = proc.shape_param_indices.iter().chain(std::iter::once(&proc.yield_index));
            for &idx in all {
                if idx >= parameters.len() {
                    return Err(Error::Validation(format!(
                        "process '{}' references out-of-range parameter index {idx}",
                        proc.name
                    )));
                }
            }
            for obs in proc.pdf.observables() {
                if data.column(obs).is_none() {
                    return Err(Error::Validation(format!(
                        "process '{}' needs observable '{obs}' missing from data",
                        proc.name
                    )));
                }
            }
        }

        Ok(Self { parameters, data, processes })
    }

    /// Model parameters.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Observed events.
    pub fn data(&self) -> &Arc<EventStore> {
        &self.data
    }

    /// Mixture components.
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Same parameters and processes on another dataset (e.g. the failing probes of a bin).
    pub fn with_data(&self, data: Arc<EventStore>) -> Result<Self> {
        Self::new(self.parameters.clone(), data, self.processes.clone())
    }

    /// Same model with one parameter's starting value replaced (clamped into its bounds).
    pub fn with_init(&self, index: usize, value: f64) -> Result<Self> {
        let mut m = self.clone();
        let p = m.parameters.get_mut(index).ok_or_else(|| {
            Error::Validation(format!("parameter index {index} out of range"))
        })?;
        p.init = value.clamp(p.bounds.0, p.bounds.1);
        Ok(m)
    }

    fn validate_params_len(&self, len: usize) -> Result<()> {
        if len != self.parameters.len() {
            return Err(Error::Validation(format!(
                "parameter length mismatch: expected {}, got {}",
                self.parameters.len(),
                len
            )));
        }
        Ok(())
    }

    fn nll_and_grad_internal(
        &self,
        params: &[f64],
        want_grad: bool,
    ) -> Result<(f64, Option<Vec<f64>>)> {
        self.validate_params_len(params.len())?;

        let n_events = self.data.n_events();
        let n_proc = self.processes.len();
        let weights = self.data.weights();

        let mut yields = vec![0.0f64; n_proc];
        let mut logps: Vec<Vec<f64>> = Vec::with_capacity(n_proc);
        let mut dlogps: Vec<Vec<f64>> = Vec::with_capacity(n_proc);

        for (pidx, proc) in self.processes.iter().enumerate() {
            yields[pidx] = params[proc.yield_index];

            let shape_params: Vec<f64> =
                proc.shape_param_indices.iter().map(|&idx| params[idx]).collect();

            let mut lp = vec![0.0f64; n_events];
            if want_grad {
                let mut dlp = vec![0.0f64; n_events * proc.pdf.n_params()];
                proc.pdf.log_prob_grad_batch(&self.data, &shape_params, &mut lp, &mut dlp)?;
                dlogps.push(dlp);
            } else {
                proc.pdf.log_prob_batch(&self.data, &shape_params, &mut lp)?;
            }
            logps.push(lp);
        }

        let mut nll: f64 = yields.iter().sum();

        let mut shape_offsets = vec![0usize; n_proc];
        let mut total_shape = 0usize;
        for (p, proc) in self.processes.iter().enumerate() {
            shape_offsets[p] = total_shape;
            total_shape += proc.pdf.n_params();
        }

        let weight = |i: usize| weights.map_or(1.0, |w| w[i]);

        if !want_grad {
            #[derive(Clone)]
            struct NllAcc {
                sum_logf: f64,
                tmp_terms: Vec<f64>,
            }

            let init = || NllAcc { sum_logf: 0.0, tmp_terms: vec![0.0; n_proc] };
            let acc = (0..n_events)
                .into_par_iter()
                .fold(init, |mut acc, i| {
                    let w = weight(i);
                    if w == 0.0 {
                        return acc;
                    }
                    for p in 0..n_proc {
                        let nu = yields[p];
                        acc.tmp_terms[p] =
                            if nu > 0.0 { nu.ln() + logps[p][i] } else { f64::NEG_INFINITY };
                    }
                    acc.sum_logf += w * logsumexp(&acc.tmp_terms);
                    acc
                })
                .reduce(init, |mut a, b| {
                    a.sum_logf += b.sum_logf;
                    a
                });

            nll -= acc.sum_logf;
            return Ok((nll, None));
        }

        let mut g = vec![0.0f64; params.len()];
        for proc in &self.processes {
            g[proc.yield_index] += 1.0;
        }

        #[derive(Clone)]
        struct Acc {
            sum_logf: f64,
            sum_r_over_nu: Vec<f64>,
            sum_r_dlogp: Vec<f64>,
            tmp_terms: Vec<f64>,
        }

        let init = || Acc {
            sum_logf: 0.0,
            sum_r_over_nu: vec![0.0; n_proc],
            sum_r_dlogp: vec![0.0; total_shape],
            tmp_terms: vec![0.0; n_proc],
        };

        let acc = (0..n_events)
            .into_par_iter()
            .fold(init, |mut acc, i| {
                let w = weight(i);
                if w == 0.0 {
                    return acc;
                }
                for p in 0..n_proc {
                    let nu = yields[p];
                    acc.tmp_terms[p] =
                        if nu > 0.0 { nu.ln() + logps[p][i] } else { f64::NEG_INFINITY };
                }
                let logf = logsumexp(&acc.tmp_terms);
                acc.sum_logf += w * logf;

                for p in 0..n_proc {
                    let nu = yields[p];
                    if nu <= 0.0 {
                        continue;
                    }
                    // Posterior share of event i in process p.
                    let r = w * (acc.tmp_terms[p] - logf).exp();
                    acc.sum_r_over_nu[p] += r / nu;

                    let nsp = self.processes[p].pdf.n_params();
                    let off = shape_offsets[p];
                    let base = i * nsp;
                    for j in 0..nsp {
                        acc.sum_r_dlogp[off + j] += r * dlogps[p][base + j];
                    }
                }
                acc
            })
            .reduce(init, |mut a, b| {
                a.sum_logf += b.sum_logf;
                for p in 0..n_proc {
                    a.sum_r_over_nu[p] += b.sum_r_over_nu[p];
                }
                for k in 0..total_shape {
                    a.sum_r_dlogp[k] += b.sum_r_dlogp[k];
                }
                a
            });

        nll -= acc.sum_logf;

        for (p, proc) in self.processes.iter().enumerate() {
            g[proc.yield_index] -= acc.sum_r_over_nu[p];
            for (j, &global_idx) in proc.shape_param_indices.iter().enumerate() {
                g[global_idx] -= acc.sum_r_dlogp[shape_offsets[p] + j];
            }
        }

        Ok((nll, Some(g)))
    }
}

impl LogDensityModel for TnpBinModel {
    fn dim(&self) -> usize {
        self.parameters.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| p.bounds).collect()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.init).collect()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        let (nll, _) = self.nll_and_grad_internal(params, false)?;
        Ok(nll)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        let (_, grad) = self.nll_and_grad_internal(params, true)?;
        Ok(grad.unwrap_or_default())
    }
}
