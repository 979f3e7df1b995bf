//! Error-function turn-on times a falling exponential, the usual tag-and-probe background.

use super::{BoundShape, UnbinnedPdf, validate_len_and_finite};
use crate::param::Param;
use statrs::function::erf::erfc;
use std::sync::Arc;
use tnp_core::{Error, Result};

/// Exponent magnitude beyond which the exponential factor is saturated.
const EXP_GUARD: f64 = 70.0;

/// Parameter snapshot of the CMS background shape
/// `erfc((acms - x) beta) exp(-gamma (x - peak))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CmsShapeParams {
    /// Turn-on position.
    pub acms: f64,
    /// Turn-on steepness.
    pub beta: f64,
    /// Exponential slope.
    pub gamma: f64,
    /// Reference point of the exponential.
    pub peak: f64,
}

impl CmsShapeParams {
    /// Number of shape parameters.
    pub const N_PARAMS: usize = 4;

    /// Parameter names in slice order.
    pub const NAMES: [&'static str; 4] = ["acms", "beta", "gamma", "peak"];

    /// Build from a slice in [`CmsShapeParams::NAMES`] order.
    pub fn from_slice(p: &[f64]) -> Result<Self> {
        if p.len() < Self::N_PARAMS {
            return Err(Error::Validation(format!(
                "CmsShape expects {} params, got {}",
                Self::N_PARAMS,
                p.len()
            )));
        }
        Ok(Self { acms: p[0], beta: p[1], gamma: p[2], peak: p[3] })
    }

    /// Unnormalized density at `x`.
    ///
    /// The exponential factor saturates at `1e20` below `-70` and vanishes above `70`.
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        let erf_part = erfc((self.acms - x) * self.beta);
        let u = (x - self.peak) * self.gamma;
        if u < -EXP_GUARD {
            erf_part * 1e20
        } else if u > EXP_GUARD {
            0.0
        } else {
            erf_part * (-u).exp()
        }
    }
}

/// Parameter cells of a bound [`CmsShape`].
#[derive(Debug, Clone)]
pub struct CmsShapeVars {
    /// Turn-on position.
    pub acms: Param,
    /// Turn-on steepness.
    pub beta: Param,
    /// Exponential slope.
    pub gamma: Param,
    /// Reference point.
    pub peak: Param,
}

/// CMS background bound to an observable and parameter cells.
#[derive(Debug, Clone)]
pub struct CmsShape {
    name: String,
    x: Param,
    vars: CmsShapeVars,
}

impl CmsShape {
    /// Bind a new instance.
    pub fn new(name: impl Into<String>, x: Param, vars: CmsShapeVars) -> Self {
        Self { name: name.into(), x, vars }
    }

    fn snapshot(&self) -> CmsShapeParams {
        CmsShapeParams {
            acms: self.vars.acms.value(),
            beta: self.vars.beta.value(),
            gamma: self.vars.gamma.value(),
            peak: self.vars.peak.value(),
        }
    }
}

impl BoundShape for CmsShape {
    fn name(&self) -> &str {
        &self.name
    }

    fn observable(&self) -> &Param {
        &self.x
    }

    fn parameters(&self) -> Vec<Param> {
        let v = &self.vars;
        [&v.acms, &v.beta, &v.gamma, &v.peak].into_iter().map(Arc::clone).collect()
    }

    fn evaluate_at(&self, x: f64) -> f64 {
        self.snapshot().value(x)
    }

    fn clone_as(&self, name: &str) -> Box<dyn BoundShape> {
        Box::new(Self { name: name.to_string(), x: Arc::clone(&self.x), vars: self.vars.clone() })
    }
}

/// Normalized CMS background on the observable bounds.
///
/// Shape parameters: `[acms, beta, gamma, peak]`.
#[derive(Debug, Clone)]
pub struct CmsShapePdf {
    observables: [String; 1],
}

impl CmsShapePdf {
    /// Create a PDF for the named observable.
    pub fn new(observable: impl Into<String>) -> Self {
        Self { observables: [observable.into()] }
    }
}

impl UnbinnedPdf for CmsShapePdf {
    fn n_params(&self) -> usize {
        CmsShapeParams::N_PARAMS
    }

    fn param_names(&self) -> Vec<String> {
        CmsShapeParams::NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn observables(&self) -> &[String] {
        &self.observables
    }

    fn shape_value(&self, x: f64, params: &[f64], _bounds: (f64, f64)) -> f64 {
        match CmsShapeParams::from_slice(params) {
            Ok(p) => p.value(x),
            Err(_) => f64::NAN,
        }
    }

    fn breakpoints(&self, params: &[f64], _bounds: (f64, f64)) -> Vec<f64> {
        // Turn-on: most of the shape's curvature sits around `acms`.
        params.first().map(|&a| vec![a]).unwrap_or_default()
    }

    fn validate_params(&self, params: &[f64]) -> Result<()> {
        validate_len_and_finite("CmsShapePdf", CmsShapeParams::N_PARAMS, params)
    }
}
