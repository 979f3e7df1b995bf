//! Bounded L-BFGS minimization of a model NLL on top of argmin.
//!
//! Fixed parameters (`low == high`) never enter the search vector. The solver works on the
//! free coordinates only; every trial point is embedded back into the full parameter vector,
//! clamped to the box, before the model is evaluated.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tnp_core::traits::LogDensityModel;
use tnp_core::{Error, Result};

/// Configuration for the L-BFGS minimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the gradient norm
    pub tol: f64,
    /// Number of corrections kept for the inverse-Hessian approximation
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Minimum found by [`BoundedLbfgs::minimize`].
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Full parameter vector, fixed parameters included.
    pub parameters: Vec<f64>,
    /// NLL at `parameters`.
    pub nll: f64,
    /// Solver iterations.
    pub n_iter: u64,
    /// NLL evaluations.
    pub n_fev: usize,
    /// Gradient evaluations.
    pub n_gev: usize,
    /// Whether the solver reached its tolerance.
    pub converged: bool,
    /// Solver termination status.
    pub message: String,
}

/// Split of a box-constrained parameter vector into free and fixed coordinates.
#[derive(Debug, Clone)]
pub struct FreeSubspace {
    template: Vec<f64>,
    free: Vec<usize>,
    bounds: Vec<(f64, f64)>,
}

impl FreeSubspace {
    /// Fixed coordinates take their value from `start`, clamped to the bounds.
    pub fn new(start: &[f64], bounds: &[(f64, f64)]) -> Result<Self> {
        if start.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "start point has {} entries but there are {} bounds",
                start.len(),
                bounds.len()
            )));
        }
        if let Some((i, &(lo, hi))) =
            bounds.iter().enumerate().find(|(_, b)| b.0.is_nan() || b.1.is_nan() || b.0 > b.1)
        {
            return Err(Error::Validation(format!("parameter {i}: invalid bounds ({lo}, {hi})")));
        }
        if let Some(i) = start.iter().position(|v| !v.is_finite()) {
            return Err(Error::Validation(format!("parameter {i}: start value is not finite")));
        }
        let template =
            start.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect::<Vec<_>>();
        let free = bounds.iter().enumerate().filter(|(_, b)| b.0 < b.1).map(|(i, _)| i).collect();
        Ok(Self { template, free, bounds: bounds.to_vec() })
    }

    /// Indices of the free parameters in the full vector.
    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    /// Free coordinates of the start point after clamping.
    pub fn start(&self) -> Vec<f64> {
        self.reduce(&self.template)
    }

    /// Free coordinates of a full vector.
    pub fn reduce(&self, full: &[f64]) -> Vec<f64> {
        self.free.iter().map(|&i| full[i]).collect()
    }

    /// Full vector for free coordinates `z`, each clamped to its bounds.
    pub fn embed(&self, z: &[f64]) -> Vec<f64> {
        let mut full = self.template.clone();
        for (&i, &v) in self.free.iter().zip(z) {
            let (lo, hi) = self.bounds[i];
            full[i] = v.clamp(lo, hi);
        }
        full
    }

    /// Free block of a full gradient, with components pointing out of the box at an active
    /// bound set to zero.
    pub fn project_gradient(&self, full_point: &[f64], full_grad: &[f64]) -> Vec<f64> {
        const EPS: f64 = 1e-12;
        self.free
            .iter()
            .map(|&i| {
                let (lo, hi) = self.bounds[i];
                let (x, g) = (full_point[i], full_grad[i]);
                if (x <= lo + EPS && g > 0.0) || (x >= hi - EPS && g < 0.0) { 0.0 } else { g }
            })
            .collect()
    }
}

#[derive(Default)]
struct Counters {
    fev: AtomicUsize,
    gev: AtomicUsize,
}

struct NllProblem<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
    space: &'a FreeSubspace,
    counters: &'a Counters,
}

fn to_argmin(e: Error) -> argmin::core::Error {
    argmin::core::Error::msg(e.to_string())
}

impl<M: LogDensityModel + ?Sized> CostFunction for NllProblem<'_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> std::result::Result<f64, argmin::core::Error> {
        self.counters.fev.fetch_add(1, Ordering::Relaxed);
        self.model.nll(&self.space.embed(z)).map_err(to_argmin)
    }
}

impl<M: LogDensityModel + ?Sized> Gradient for NllProblem<'_, M> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Self::Param) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        self.counters.gev.fetch_add(1, Ordering::Relaxed);
        let full = self.space.embed(z);
        let g = self.model.grad_nll(&full).map_err(to_argmin)?;
        Ok(self.space.project_gradient(&full, &g))
    }
}

/// L-BFGS over the free parameters of a [`LogDensityModel`], box constraints by clamping.
#[derive(Debug, Clone, Default)]
pub struct BoundedLbfgs {
    config: OptimizerConfig,
}

impl BoundedLbfgs {
    /// Minimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `model.nll` from `start` inside `model.parameter_bounds()`.
    pub fn minimize<M: LogDensityModel + ?Sized>(&self, model: &M, start: &[f64]) -> Result<Minimum> {
        if start.len() != model.dim() {
            return Err(Error::Validation(format!(
                "start point length {} != model dimension {}",
                start.len(),
                model.dim()
            )));
        }
        let space = FreeSubspace::new(start, &model.parameter_bounds())?;

        if space.free_indices().is_empty() {
            let parameters = space.embed(&[]);
            let nll = model.nll(&parameters)?;
            return Ok(Minimum {
                parameters,
                nll,
                n_iter: 0,
                n_fev: 1,
                n_gev: 0,
                converged: true,
                message: "all parameters fixed".into(),
            });
        }

        let counters = Counters::default();
        let problem = NllProblem { model, space: &space, counters: &counters };

        // argmin's default cost tolerance is ~EPS, far too strict for NLLs of O(1e4).
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("invalid optimizer configuration: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(space.start()).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("NLL minimization failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("minimizer returned no parameters".into()))?;
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );

        Ok(Minimum {
            parameters: space.embed(best),
            nll: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_fev: counters.fev.load(Ordering::Relaxed),
            n_gev: counters.gev.load(Ordering::Relaxed),
            converged,
            message: termination.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // (a - 2)^2 + (b - 3)^2 + (c + 1)^2 + a*b/10, with an optional fixed `b`.
    struct Bowl {
        bounds: Vec<(f64, f64)>,
    }

    impl LogDensityModel for Bowl {
        fn dim(&self) -> usize {
            3
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["a".into(), "b".into(), "c".into()]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            self.bounds.clone()
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![0.0, 0.0, 0.0]
        }

        fn nll(&self, p: &[f64]) -> tnp_core::Result<f64> {
            Ok((p[0] - 2.0).powi(2) + (p[1] - 3.0).powi(2) + (p[2] + 1.0).powi(2) + 0.1 * p[0] * p[1])
        }

        fn grad_nll(&self, p: &[f64]) -> tnp_core::Result<Vec<f64>> {
            Ok(vec![2.0 * (p[0] - 2.0) + 0.1 * p[1], 2.0 * (p[1] - 3.0) + 0.1 * p[0], 2.0 * (p[2] + 1.0)])
        }
    }

    #[test]
    fn test_minimize_fixed_parameter_stays_put() {
        let bowl = Bowl { bounds: vec![(-10.0, 10.0), (5.0, 5.0), (-10.0, 10.0)] };
        // The fixed start value lies outside its (degenerate) box and is clamped onto it.
        let min = BoundedLbfgs::default().minimize(&bowl, &[0.0, 9.0, 0.0]).unwrap();

        assert!(min.converged, "{}", min.message);
        assert_eq!(min.parameters[1], 5.0);
        // d/da: 2(a - 2) + 0.5 = 0
        assert_relative_eq!(min.parameters[0], 1.75, epsilon = 1e-5);
        assert_relative_eq!(min.parameters[2], -1.0, epsilon = 1e-5);
        assert!(min.n_fev > 0 && min.n_gev > 0);
    }

    #[test]
    fn test_minimize_stops_at_active_bounds() {
        let bowl = Bowl { bounds: vec![(3.0, 5.0), (1.0, 2.0), (0.0, 1.0)] };
        let min = BoundedLbfgs::default().minimize(&bowl, &[4.0, 1.5, 0.5]).unwrap();

        assert_relative_eq!(min.parameters[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(min.parameters[1], 2.0, epsilon = 1e-4);
        assert_relative_eq!(min.parameters[2], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_minimize_all_fixed_evaluates_once() {
        let bowl = Bowl { bounds: vec![(1.0, 1.0), (2.0, 2.0), (0.0, 0.0)] };
        let min = BoundedLbfgs::default().minimize(&bowl, &[1.0, 2.0, 0.0]).unwrap();
        assert!(min.converged);
        assert_eq!(min.n_iter, 0);
        assert_relative_eq!(min.nll, 1.0 + 1.0 + 1.0 + 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_minimize_rejects_bad_input() {
        let bowl = Bowl { bounds: vec![(-1.0, 1.0); 3] };
        assert!(BoundedLbfgs::default().minimize(&bowl, &[0.0]).is_err());
        assert!(BoundedLbfgs::default().minimize(&bowl, &[0.0, f64::NAN, 0.0]).is_err());
        let inverted = Bowl { bounds: vec![(-1.0, 1.0), (2.0, 1.0), (-1.0, 1.0)] };
        assert!(BoundedLbfgs::default().minimize(&inverted, &[0.0; 3]).is_err());
    }

    #[test]
    fn test_subspace_embed_and_projection() {
        let space = FreeSubspace::new(&[0.5, 7.0, 0.0], &[(0.0, 1.0), (3.0, 3.0), (0.0, 1.0)]).unwrap();
        assert_eq!(space.free_indices(), &[0, 2]);
        assert_eq!(space.start(), vec![0.5, 0.0]);
        assert_eq!(space.reduce(&[0.25, 3.0, 0.75]), vec![0.25, 0.75]);
        assert_eq!(space.embed(&[2.0, -1.0]), vec![1.0, 3.0, 0.0]);

        // Upper bound active on the first coordinate, lower on the last.
        let g = space.project_gradient(&[1.0, 3.0, 0.0], &[-4.0, 9.0, 2.0]);
        assert_eq!(g, vec![0.0, 0.0]);
        let g = space.project_gradient(&[1.0, 3.0, 0.0], &[4.0, 9.0, -2.0]);
        assert_eq!(g, vec![4.0, -2.0]);
    }
}
