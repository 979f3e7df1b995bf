//! Gaussian core with Bernstein-polynomial tails anchored at the Gaussian transition value.

use super::{BoundShape, UnbinnedPdf, validate_len_and_finite};
use crate::math::{bernstein_monomial, gaussian_core};
use crate::param::Param;
use std::sync::Arc;
use tnp_core::{Error, Result};

/// Which tail a coefficient list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Below the peak, between the lower domain edge and the left transition.
    Left,
    /// Above the peak, between the right transition and the upper domain edge.
    Right,
}

/// Read access to a list of free Bernstein coefficients.
pub trait CoefficientSource {
    /// Number of free coefficients (the polynomial order).
    fn count(&self) -> usize;
    /// Current value of coefficient `i`.
    fn coefficient(&self, i: usize) -> f64;
}

impl CoefficientSource for [f64] {
    fn count(&self) -> usize {
        self.len()
    }

    fn coefficient(&self, i: usize) -> f64 {
        self[i]
    }
}

impl CoefficientSource for [Param] {
    fn count(&self) -> usize {
        self.len()
    }

    fn coefficient(&self, i: usize) -> f64 {
        self[i].value()
    }
}

/// Coefficient of basis term `i` for a tail with `free.count()` free coefficients.
///
/// The term touching the Gaussian transition is pinned to `anchor` so the tail meets the
/// core continuously; the others are `anchor * free[k]`. On the left the pinned term is the
/// last one (`i == order`), on the right the first one (`i == 0`).
pub fn basis_coefficient<C: CoefficientSource + ?Sized>(
    anchor: f64,
    i: usize,
    side: Side,
    free: &C,
) -> f64 {
    let order = free.count();
    match side {
        Side::Left if i < order => anchor * free.coefficient(i),
        Side::Right if i > 0 => anchor * free.coefficient(i - 1),
        _ => anchor,
    }
}

/// All `order + 1` basis coefficients of one tail.
pub fn expand_coefficients(anchor: f64, free: &[f64], side: Side) -> Vec<f64> {
    (0..=free.len()).map(|i| basis_coefficient(anchor, i, side, free)).collect()
}

/// Bernstein tail `Σ_i c_i t^i (1 - t)^(order - i)` at local coordinate `t`.
///
/// No binomial weights: the free coefficients absorb them.
pub fn bernstein_tail<C: CoefficientSource + ?Sized>(
    t: f64,
    anchor: f64,
    side: Side,
    free: &C,
) -> f64 {
    let order = free.count();
    (0..=order)
        .map(|i| basis_coefficient(anchor, i, side, free) * bernstein_monomial(t, i, order))
        .sum()
}

/// Scalar parameters of [`gauss_bern`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussBernCore {
    /// Peak position.
    pub x0: f64,
    /// Gaussian width (shared by both sides).
    pub sigma: f64,
    /// Left transition in units of `sigma`.
    pub alpha_l: f64,
    /// Right transition in units of `sigma`.
    pub alpha_r: f64,
}

impl GaussBernCore {
    /// Left and right transition points.
    pub fn boundaries(&self) -> (f64, f64) {
        (self.x0 - self.alpha_l * self.sigma, self.x0 + self.alpha_r * self.sigma)
    }
}

/// Unnormalized Gaussian-with-Bernstein-tails at `x` on the domain `(low, high)`.
///
/// The region follows from `d = (x - x0)/sigma`: left tail for `d < -alpha_l`, Gaussian core
/// for `d < alpha_r`, right tail otherwise. The ordering holds for any sign of `sigma`. Each
/// tail polynomial runs in a local coordinate spanning its transition point
/// `x0 ∓ alpha sigma` to the domain edge. If a transition lies on its domain edge that tail's
/// coordinate degenerates and the result may be non-finite.
pub fn gauss_bern<L, R>(x: f64, domain: (f64, f64), core: &GaussBernCore, left: &L, right: &R) -> f64
where
    L: CoefficientSource + ?Sized,
    R: CoefficientSource + ?Sized,
{
    let (low, high) = domain;
    let d = (x - core.x0) / core.sigma;

    if d < -core.alpha_l {
        let (b_left, _) = core.boundaries();
        let t = (x - low) / (b_left - low);
        bernstein_tail(t, gaussian_core(core.alpha_l), Side::Left, left)
    } else if d < core.alpha_r {
        gaussian_core(d)
    } else {
        let (_, b_right) = core.boundaries();
        let t = (x - b_right) / (high - b_right);
        bernstein_tail(t, gaussian_core(core.alpha_r), Side::Right, right)
    }
}

/// Parameter cells of a bound [`GaussBern`].
#[derive(Debug, Clone)]
pub struct GaussBernVars {
    /// Peak position.
    pub x0: Param,
    /// Gaussian width.
    pub sigma: Param,
    /// Left transition.
    pub alpha_l: Param,
    /// Right transition.
    pub alpha_r: Param,
    /// Free left-tail coefficients; the count is the left order.
    pub coefs_l: Vec<Param>,
    /// Free right-tail coefficients; the count is the right order.
    pub coefs_r: Vec<Param>,
}

impl GaussBernVars {
    /// Read the scalar cells.
    pub fn core(&self) -> GaussBernCore {
        GaussBernCore {
            x0: self.x0.value(),
            sigma: self.sigma.value(),
            alpha_l: self.alpha_l.value(),
            alpha_r: self.alpha_r.value(),
        }
    }
}

/// Gaussian with Bernstein tails bound to an observable and parameter cells.
///
/// The fit domain is the observable's `(min, max)` at evaluation time.
#[derive(Debug, Clone)]
pub struct GaussBern {
    name: String,
    x: Param,
    vars: GaussBernVars,
}

impl GaussBern {
    /// Bind a new instance.
    pub fn new(name: impl Into<String>, x: Param, vars: GaussBernVars) -> Self {
        Self { name: name.into(), x, vars }
    }

    /// The parameter cells.
    pub fn vars(&self) -> &GaussBernVars {
        &self.vars
    }
}

impl BoundShape for GaussBern {
    fn name(&self) -> &str {
        &self.name
    }

    fn observable(&self) -> &Param {
        &self.x
    }

    fn parameters(&self) -> Vec<Param> {
        let v = &self.vars;
        [&v.x0, &v.sigma, &v.alpha_l, &v.alpha_r]
            .into_iter()
            .chain(v.coefs_l.iter())
            .chain(v.coefs_r.iter())
            .map(Arc::clone)
            .collect()
    }

    fn evaluate_at(&self, x: f64) -> f64 {
        gauss_bern(
            x,
            self.x.bounds(),
            &self.vars.core(),
            self.vars.coefs_l.as_slice(),
            self.vars.coefs_r.as_slice(),
        )
    }

    fn clone_as(&self, name: &str) -> Box<dyn BoundShape> {
        Box::new(Self { name: name.to_string(), x: Arc::clone(&self.x), vars: self.vars.clone() })
    }
}

/// Normalized Gaussian with Bernstein tails on the observable bounds.
///
/// Shape parameters: `[x0, sigma, alphaL, alphaR, bernL0.., bernR0..]` with `order_l` left and
/// `order_r` right coefficients.
#[derive(Debug, Clone)]
pub struct GaussBernPdf {
    observables: [String; 1],
    order_l: usize,
    order_r: usize,
}

impl GaussBernPdf {
    /// Create a PDF with the given tail orders.
    pub fn new(observable: impl Into<String>, order_l: usize, order_r: usize) -> Self {
        Self { observables: [observable.into()], order_l, order_r }
    }

    /// Left and right orders.
    pub fn orders(&self) -> (usize, usize) {
        (self.order_l, self.order_r)
    }

    fn split<'a>(&self, params: &'a [f64]) -> (GaussBernCore, &'a [f64], &'a [f64]) {
        let core = GaussBernCore {
            x0: params[0],
            sigma: params[1],
            alpha_l: params[2],
            alpha_r: params[3],
        };
        let (left, right) = params[4..].split_at(self.order_l);
        (core, left, right)
    }
}

impl UnbinnedPdf for GaussBernPdf {
    fn n_params(&self) -> usize {
        4 + self.order_l + self.order_r
    }

    fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            ["x0", "sigma", "alphaL", "alphaR"].iter().map(|s| s.to_string()).collect();
        names.extend((0..self.order_l).map(|i| format!("bernL{i}")));
        names.extend((0..self.order_r).map(|i| format!("bernR{i}")));
        names
    }

    fn observables(&self) -> &[String] {
        &self.observables
    }

    fn shape_value(&self, x: f64, params: &[f64], bounds: (f64, f64)) -> f64 {
        if params.len() != self.n_params() {
            return f64::NAN;
        }
        let (core, left, right) = self.split(params);
        gauss_bern(x, bounds, &core, left, right)
    }

    fn breakpoints(&self, params: &[f64], _bounds: (f64, f64)) -> Vec<f64> {
        if params.len() != self.n_params() {
            return Vec::new();
        }
        let (lo, hi) = self.split(params).0.boundaries();
        vec![lo, hi]
    }

    fn validate_params(&self, params: &[f64]) -> Result<()> {
        validate_len_and_finite("GaussBernPdf", self.n_params(), params)?;
        if params[1] <= 0.0 {
            return Err(Error::Validation(format!(
                "GaussBernPdf requires sigma > 0, got {}",
                params[1]
            )));
        }
        Ok(())
    }
}
