//! Crystal Ball on the tail side of the peak joined to a Gaussian of independent width on the
//! other side.

use super::{BoundShape, UnbinnedPdf, validate_len_and_finite};
use crate::math::{gaussian_core, power_law_tail};
use crate::param::Param;
use std::sync::Arc;
use tnp_core::{Error, Result};

/// Parameter snapshot of the Crystal-Ball-plus-Gaussian shape.
///
/// Let `t` be the distance from `m0` in units of `sigma`, positive away from the tail side.
/// Then the value is `exp(-((m - m0)/sigma_2)²/2)` for `t >= 0`, `exp(-t²/2)` for
/// `-|alpha| <= t < 0`, and the Crystal-Ball power law beyond. Both halves equal 1 at `m0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CbExGaussParams {
    /// Peak position.
    pub m0: f64,
    /// Width on the Crystal-Ball side.
    pub sigma: f64,
    /// Gaussian/tail transition in units of `sigma`; only `|alpha|` is used.
    pub alpha: f64,
    /// Tail exponent.
    pub n: f64,
    /// Width of the Gaussian on the opposite side.
    pub sigma_2: f64,
    /// `>= 0` puts the power-law tail below the peak, `< 0` above it.
    pub tail_left: f64,
}

impl CbExGaussParams {
    /// Number of shape parameters.
    pub const N_PARAMS: usize = 6;

    /// Parameter names in slice order.
    pub const NAMES: [&'static str; 6] = ["m0", "sigma", "alpha", "n", "sigma_2", "tail_left"];

    /// Build from a slice in [`CbExGaussParams::NAMES`] order.
    pub fn from_slice(p: &[f64]) -> Result<Self> {
        if p.len() < Self::N_PARAMS {
            return Err(Error::Validation(format!(
                "CbExGauss expects {} params, got {}",
                Self::N_PARAMS,
                p.len()
            )));
        }
        Ok(Self { m0: p[0], sigma: p[1], alpha: p[2], n: p[3], sigma_2: p[4], tail_left: p[5] })
    }

    /// Whether the power-law tail is on the low-mass side.
    #[inline]
    pub fn tail_is_left(&self) -> bool {
        self.tail_left >= 0.0
    }

    /// Unnormalized density at `m`.
    #[inline]
    pub fn value(&self, m: f64) -> f64 {
        let dm = m - self.m0;
        let t = if self.tail_is_left() { dm / self.sigma } else { -dm / self.sigma };
        let abs_alpha = self.alpha.abs();
        if t >= 0.0 {
            gaussian_core(dm / self.sigma_2)
        } else if t >= -abs_alpha {
            gaussian_core(t)
        } else {
            power_law_tail(-t, abs_alpha, self.n)
        }
    }

    /// Region boundaries: tail transition and peak.
    pub fn breakpoints(&self) -> [f64; 2] {
        let d = self.alpha.abs() * self.sigma;
        let transition = if self.tail_is_left() { self.m0 - d } else { self.m0 + d };
        [transition, self.m0]
    }
}

/// Parameter cells of a bound [`CbExGauss`].
#[derive(Debug, Clone)]
pub struct CbExGaussVars {
    /// Peak position.
    pub m0: Param,
    /// Crystal-Ball width.
    pub sigma: Param,
    /// Transition.
    pub alpha: Param,
    /// Exponent.
    pub n: Param,
    /// Opposite-side width.
    pub sigma_2: Param,
    /// Tail side selector.
    pub tail_left: Param,
}

impl CbExGaussVars {
    /// Read the current values of all cells.
    pub fn snapshot(&self) -> CbExGaussParams {
        CbExGaussParams {
            m0: self.m0.value(),
            sigma: self.sigma.value(),
            alpha: self.alpha.value(),
            n: self.n.value(),
            sigma_2: self.sigma_2.value(),
            tail_left: self.tail_left.value(),
        }
    }
}

/// Crystal-Ball-plus-Gaussian bound to an observable and parameter cells.
#[derive(Debug, Clone)]
pub struct CbExGauss {
    name: String,
    m: Param,
    vars: CbExGaussVars,
}

impl CbExGauss {
    /// Bind a new instance.
    pub fn new(name: impl Into<String>, m: Param, vars: CbExGaussVars) -> Self {
        Self { name: name.into(), m, vars }
    }

    /// The parameter cells.
    pub fn vars(&self) -> &CbExGaussVars {
        &self.vars
    }
}

impl BoundShape for CbExGauss {
    fn name(&self) -> &str {
        &self.name
    }

    fn observable(&self) -> &Param {
        &self.m
    }

    fn parameters(&self) -> Vec<Param> {
        let v = &self.vars;
        [&v.m0, &v.sigma, &v.alpha, &v.n, &v.sigma_2, &v.tail_left]
            .into_iter()
            .map(Arc::clone)
            .collect()
    }

    fn evaluate_at(&self, x: f64) -> f64 {
        self.vars.snapshot().value(x)
    }

    fn clone_as(&self, name: &str) -> Box<dyn BoundShape> {
        Box::new(Self { name: name.to_string(), m: Arc::clone(&self.m), vars: self.vars.clone() })
    }
}

/// Normalized Crystal-Ball-plus-Gaussian on the observable bounds.
///
/// Shape parameters: `[m0, sigma, alpha, n, sigma_2, tail_left]`.
#[derive(Debug, Clone)]
pub struct CbExGaussPdf {
    observables: [String; 1],
}

impl CbExGaussPdf {
    /// Create a PDF for the named observable.
    pub fn new(observable: impl Into<String>) -> Self {
        Self { observables: [observable.into()] }
    }
}

impl UnbinnedPdf for CbExGaussPdf {
    fn n_params(&self) -> usize {
        CbExGaussParams::N_PARAMS
    }

    fn param_names(&self) -> Vec<String> {
        CbExGaussParams::NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn observables(&self) -> &[String] {
        &self.observables
    }

    fn shape_value(&self, x: f64, params: &[f64], _bounds: (f64, f64)) -> f64 {
        match CbExGaussParams::from_slice(params) {
            Ok(p) => p.value(x),
            Err(_) => f64::NAN,
        }
    }

    fn breakpoints(&self, params: &[f64], _bounds: (f64, f64)) -> Vec<f64> {
        CbExGaussParams::from_slice(params).map(|p| p.breakpoints().to_vec()).unwrap_or_default()
    }

    fn validate_params(&self, params: &[f64]) -> Result<()> {
        validate_len_and_finite("CbExGaussPdf", CbExGaussParams::N_PARAMS, params)?;
        let p = CbExGaussParams::from_slice(params)?;
        if !(p.sigma > 0.0 && p.sigma_2 > 0.0) {
            return Err(Error::Validation(format!(
                "CbExGaussPdf requires sigma > 0 and sigma_2 > 0, got ({}, {})",
                p.sigma, p.sigma_2
            )));
        }
        Ok(())
    }
}
