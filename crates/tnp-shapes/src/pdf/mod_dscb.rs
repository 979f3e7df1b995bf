//! Modified double-sided Crystal Ball: a Gaussian core with independent left/right widths
//! and, on each side, a blend of two power-law tails.

use super::{BoundShape, UnbinnedPdf, validate_len_and_finite};
use crate::math::{effective_exponent, gaussian_core, power_law_tail};
use crate::param::Param;
use std::sync::Arc;
use tnp_core::{Error, Result};

/// Parameter snapshot of the modified double-sided Crystal Ball.
///
/// With `x_L = (x - x0)/sigma_l` and `x_R = (x - x0)/sigma_r`:
///
/// - `x_L < -alpha_l`: `f_l T(-x_L; alpha_l, n_l1) + (1 - f_l) T(-x_L; alpha_l, n_l2')`
/// - `x_L < 0`: `exp(-x_L²/2)`
/// - `x_R < alpha_r`: `exp(-x_R²/2)`
/// - otherwise: `f_r T(x_R; alpha_r, n_r1) + (1 - f_r) T(x_R; alpha_r, n_r2')`
///
/// where `T` is [`power_law_tail`] and `n_2' = max(n_1, n_2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModDscbParams {
    /// Peak position.
    pub x0: f64,
    /// Width left of the peak.
    pub sigma_l: f64,
    /// Width right of the peak.
    pub sigma_r: f64,
    /// Left Gaussian/tail transition in units of `sigma_l`.
    pub alpha_l: f64,
    /// Left tail exponent, first component.
    pub n_l1: f64,
    /// Left tail exponent, second component.
    pub n_l2: f64,
    /// Weight of the first left component.
    pub f_l: f64,
    /// Right Gaussian/tail transition in units of `sigma_r`.
    pub alpha_r: f64,
    /// Right tail exponent, first component.
    pub n_r1: f64,
    /// Right tail exponent, second component.
    pub n_r2: f64,
    /// Weight of the first right component.
    pub f_r: f64,
}

impl ModDscbParams {
    /// Number of shape parameters.
    pub const N_PARAMS: usize = 11;

    /// Parameter names in slice order.
    pub const NAMES: [&'static str; 11] =
        ["x0", "sigmaL", "sigmaR", "alphaL", "nL1", "nL2", "fL", "alphaR", "nR1", "nR2", "fR"];

    /// Build from a slice in [`ModDscbParams::NAMES`] order. Extra entries are ignored.
    pub fn from_slice(p: &[f64]) -> Result<Self> {
        if p.len() < Self::N_PARAMS {
            return Err(Error::Validation(format!(
                "ModDscb expects {} params, got {}",
                Self::N_PARAMS,
                p.len()
            )));
        }
        Ok(Self {
            x0: p[0],
            sigma_l: p[1],
            sigma_r: p[2],
            alpha_l: p[3],
            n_l1: p[4],
            n_l2: p[5],
            f_l: p[6],
            alpha_r: p[7],
            n_r1: p[8],
            n_r2: p[9],
            f_r: p[10],
        })
    }

    /// Values in [`ModDscbParams::NAMES`] order.
    pub fn to_array(&self) -> [f64; 11] {
        [
            self.x0,
            self.sigma_l,
            self.sigma_r,
            self.alpha_l,
            self.n_l1,
            self.n_l2,
            self.f_l,
            self.alpha_r,
            self.n_r1,
            self.n_r2,
            self.f_r,
        ]
    }

    /// Unnormalized density at `x`.
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        mod_dscb(x, self)
    }

    /// Region boundaries: left transition, peak, right transition.
    pub fn breakpoints(&self) -> [f64; 3] {
        [
            self.x0 - self.alpha_l * self.sigma_l,
            self.x0,
            self.x0 + self.alpha_r * self.sigma_r,
        ]
    }
}

#[inline(always)]
fn blended_tail(t: f64, alpha: f64, n1: f64, n2: f64, f: f64) -> f64 {
    let n2 = effective_exponent(n1, n2);
    f * power_law_tail(t, alpha, n1) + (1.0 - f) * power_law_tail(t, alpha, n2)
}

/// Unnormalized modified double-sided Crystal Ball at `x`.
///
/// Equals 1 at `x0` and is continuous with a continuous first derivative at both
/// transitions. Never fails: zero widths or exponents give non-finite values.
#[inline]
pub fn mod_dscb(x: f64, p: &ModDscbParams) -> f64 {
    let left_sigma = (x - p.x0) / p.sigma_l;
    let right_sigma = (x - p.x0) / p.sigma_r;

    if left_sigma < -p.alpha_l {
        blended_tail(-left_sigma, p.alpha_l, p.n_l1, p.n_l2, p.f_l)
    } else if left_sigma < 0.0 {
        gaussian_core(left_sigma)
    } else if right_sigma < p.alpha_r {
        gaussian_core(right_sigma)
    } else {
        blended_tail(right_sigma, p.alpha_r, p.n_r1, p.n_r2, p.f_r)
    }
}

/// Parameter cells of a bound [`ModDscb`], in [`ModDscbParams::NAMES`] order.
#[derive(Debug, Clone)]
pub struct ModDscbVars {
    /// Peak position.
    pub x0: Param,
    /// Left width.
    pub sigma_l: Param,
    /// Right width.
    pub sigma_r: Param,
    /// Left transition.
    pub alpha_l: Param,
    /// Left exponent 1.
    pub n_l1: Param,
    /// Left exponent 2.
    pub n_l2: Param,
    /// Left blend weight.
    pub f_l: Param,
    /// Right transition.
    pub alpha_r: Param,
    /// Right exponent 1.
    pub n_r1: Param,
    /// Right exponent 2.
    pub n_r2: Param,
    /// Right blend weight.
    pub f_r: Param,
}

impl ModDscbVars {
    /// Read the current values of all cells.
    pub fn snapshot(&self) -> ModDscbParams {
        ModDscbParams {
            x0: self.x0.value(),
            sigma_l: self.sigma_l.value(),
            sigma_r: self.sigma_r.value(),
            alpha_l: self.alpha_l.value(),
            n_l1: self.n_l1.value(),
            n_l2: self.n_l2.value(),
            f_l: self.f_l.value(),
            alpha_r: self.alpha_r.value(),
            n_r1: self.n_r1.value(),
            n_r2: self.n_r2.value(),
            f_r: self.f_r.value(),
        }
    }

    fn handles(&self) -> Vec<Param> {
        [
            &self.x0,
            &self.sigma_l,
            &self.sigma_r,
            &self.alpha_l,
            &self.n_l1,
            &self.n_l2,
            &self.f_l,
            &self.alpha_r,
            &self.n_r1,
            &self.n_r2,
            &self.f_r,
        ]
        .into_iter()
        .map(Arc::clone)
        .collect()
    }
}

/// Modified double-sided Crystal Ball bound to an observable and parameter cells.
#[derive(Debug, Clone)]
pub struct ModDscb {
    name: String,
    x: Param,
    vars: ModDscbVars,
}

impl ModDscb {
    /// Bind a new instance.
    pub fn new(name: impl Into<String>, x: Param, vars: ModDscbVars) -> Self {
        Self { name: name.into(), x, vars }
    }

    /// The parameter cells.
    pub fn vars(&self) -> &ModDscbVars {
        &self.vars
    }
}

impl BoundShape for ModDscb {
    fn name(&self) -> &str {
        &self.name
    }

    fn observable(&self) -> &Param {
        &self.x
    }

    fn parameters(&self) -> Vec<Param> {
        self.vars.handles()
    }

    fn evaluate_at(&self, x: f64) -> f64 {
        self.vars.snapshot().value(x)
    }

    fn clone_as(&self, name: &str) -> Box<dyn BoundShape> {
        Box::new(Self { name: name.to_string(), x: Arc::clone(&self.x), vars: self.vars.clone() })
    }
}

/// Normalized modified double-sided Crystal Ball on the observable bounds.
///
/// Shape parameters: `[x0, sigmaL, sigmaR, alphaL, nL1, nL2, fL, alphaR, nR1, nR2, fR]`.
#[derive(Debug, Clone)]
pub struct ModDscbPdf {
    observables: [String; 1],
}

impl ModDscbPdf {
    /// Create a PDF for the named observable.
    pub fn new(observable: impl Into<String>) -> Self {
        Self { observables: [observable.into()] }
    }
}

impl UnbinnedPdf for ModDscbPdf {
    fn n_params(&self) -> usize {
        ModDscbParams::N_PARAMS
    }

    fn param_names(&self) -> Vec<String> {
        ModDscbParams::NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn observables(&self) -> &[String] {
        &self.observables
    }

    fn shape_value(&self, x: f64, params: &[f64], _bounds: (f64, f64)) -> f64 {
        match ModDscbParams::from_slice(params) {
            Ok(p) => p.value(x),
            Err(_) => f64::NAN,
        }
    }

    fn breakpoints(&self, params: &[f64], _bounds: (f64, f64)) -> Vec<f64> {
        ModDscbParams::from_slice(params).map(|p| p.breakpoints().to_vec()).unwrap_or_default()
    }

    fn validate_params(&self, params: &[f64]) -> Result<()> {
        validate_len_and_finite("ModDscbPdf", ModDscbParams::N_PARAMS, params)?;
        let p = ModDscbParams::from_slice(params)?;
        if !(p.sigma_l > 0.0 && p.sigma_r > 0.0) {
            return Err(Error::Validation(format!(
                "ModDscbPdf requires sigmaL > 0 and sigmaR > 0, got ({}, {})",
                p.sigma_l, p.sigma_r
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::RealVar;
    use approx::assert_relative_eq;

    fn z_params() -> ModDscbParams {
        ModDscbParams {
            x0: 91.0,
            sigma_l: 2.0,
            sigma_r: 2.5,
            alpha_l: 1.2,
            n_l1: 2.0,
            n_l2: 5.0,
            f_l: 0.6,
            alpha_r: 1.5,
            n_r1: 3.0,
            n_r2: 8.0,
            f_r: 0.3,
        }
    }

    #[test]
    fn test_peak_is_one() {
        assert_relative_eq!(z_params().value(91.0), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_gaussian_core_sides() {
        let p = z_params();
        assert_relative_eq!(p.value(90.0), gaussian_core(-0.5), epsilon = 1e-15);
        assert_relative_eq!(p.value(92.0), gaussian_core(0.4), epsilon = 1e-15);
    }

    #[test]
    fn test_tails_blend_components() {
        let p = z_params();
        let x = 80.0;
        let t = (p.x0 - x) / p.sigma_l;
        let expected = 0.6 * power_law_tail(t, 1.2, 2.0) + 0.4 * power_law_tail(t, 1.2, 5.0);
        assert_relative_eq!(p.value(x), expected, max_relative = 1e-14);

        let x = 105.0;
        let t = (x - p.x0) / p.sigma_r;
        let expected = 0.3 * power_law_tail(t, 1.5, 3.0) + 0.7 * power_law_tail(t, 1.5, 8.0);
        assert_relative_eq!(p.value(x), expected, max_relative = 1e-14);
    }

    #[test]
    fn test_clamp_makes_swapped_exponents_single_component() {
        let mut p = z_params();
        p.n_l1 = 5.0;
        p.n_l2 = 2.0;
        let x = 80.0;
        let t = (p.x0 - x) / p.sigma_l;
        assert_relative_eq!(p.value(x), power_law_tail(t, 1.2, 5.0), max_relative = 1e-14);
    }

    #[test]
    fn test_breakpoints() {
        let b = z_params().breakpoints();
        assert_relative_eq!(b[0], 88.6, epsilon = 1e-12);
        assert_relative_eq!(b[1], 91.0, epsilon = 1e-12);
        assert_relative_eq!(b[2], 94.75, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_sigma_is_non_finite_not_panic() {
        let mut p = z_params();
        p.sigma_l = 0.0;
        p.sigma_r = 0.0;
        // 0/0 at the peak falls through every region test.
        assert!(p.value(91.0).is_nan());
        // Infinitely far into either tail.
        assert_eq!(p.value(90.0), 0.0);
        assert_eq!(p.value(92.0), 0.0);
    }

    /// Direct `A (B ± s)^{-n}` form with `powf`, no log-space evaluation.
    fn direct_pow_form(x: f64, p: &ModDscbParams) -> f64 {
        let tail = |s: f64, alpha: f64, n1: f64, n2: f64, f: f64| {
            let n2 = if n2 < n1 { n1 } else { n2 };
            let a = alpha.abs();
            let term = |n: f64| (n / a).powf(n) * (-0.5 * a * a).exp() * (n / a - a + s).powf(-n);
            f * term(n1) + (1.0 - f) * term(n2)
        };
        let left = (x - p.x0) / p.sigma_l;
        let right = (x - p.x0) / p.sigma_r;
        if left < -p.alpha_l {
            tail(-left, p.alpha_l, p.n_l1, p.n_l2, p.f_l)
        } else if left < 0.0 {
            (-0.5 * left * left).exp()
        } else if right < p.alpha_r {
            (-0.5 * right * right).exp()
        } else {
            tail(right, p.alpha_r, p.n_r1, p.n_r2, p.f_r)
        }
    }

    #[test]
    fn test_matches_direct_pow_form() {
        let mut flat = z_params();
        flat.alpha_l = 1.5;
        flat.n_l1 = 0.0;
        flat.n_l2 = 0.0;
        flat.n_r1 = 0.0;
        flat.n_r2 = 0.0;
        // Zero exponents: both tails sit at the anchor.
        assert_relative_eq!(flat.value(80.0), (-1.125f64).exp(), max_relative = 1e-14);

        for p in [z_params(), flat] {
            for i in 0..=120 {
                let x = 60.0 + 0.5 * i as f64;
                let (got, want) = (p.value(x), direct_pow_form(x, &p));
                assert!(got.is_finite(), "x = {x}");
                assert_relative_eq!(got, want, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_from_slice_roundtrip_order() {
        let p = z_params();
        assert_eq!(ModDscbParams::from_slice(&p.to_array()).unwrap(), p);
        assert!(ModDscbParams::from_slice(&[1.0; 10]).is_err());
    }

    #[test]
    fn test_bound_reads_cells_each_call() {
        let p = z_params();
        let cell = |n: &str, v: f64| RealVar::free(n, v);
        let x = RealVar::new("mass", 91.0, (60.0, 120.0));
        let vars = ModDscbVars {
            x0: cell("x0", p.x0),
            sigma_l: cell("sigmaL", p.sigma_l),
            sigma_r: cell("sigmaR", p.sigma_r),
            alpha_l: cell("alphaL", p.alpha_l),
            n_l1: cell("nL1", p.n_l1),
            n_l2: cell("nL2", p.n_l2),
            f_l: cell("fL", p.f_l),
            alpha_r: cell("alphaR", p.alpha_r),
            n_r1: cell("nR1", p.n_r1),
            n_r2: cell("nR2", p.n_r2),
            f_r: cell("fR", p.f_r),
        };
        let shape = ModDscb::new("sig", Arc::clone(&x), vars);
        assert_relative_eq!(shape.evaluate(), 1.0, epsilon = 1e-15);
        x.set_value(80.0);
        assert_relative_eq!(shape.evaluate(), p.value(80.0), max_relative = 1e-14);
        shape.vars().x0.set_value(80.0);
        assert_relative_eq!(shape.evaluate(), 1.0, epsilon = 1e-15);
        assert_eq!(shape.parameters().len(), ModDscbParams::N_PARAMS);
    }

    #[test]
    fn test_pdf_validation() {
        let pdf = ModDscbPdf::new("mass");
        assert!(pdf.validate_params(&z_params().to_array()).is_ok());
        let mut bad = z_params().to_array();
        bad[1] = -1.0;
        assert!(pdf.validate_params(&bad).is_err());
        assert!(pdf.validate_params(&bad[..5]).is_err());
        bad[1] = f64::NAN;
        assert!(pdf.validate_params(&bad).is_err());
    }
}
