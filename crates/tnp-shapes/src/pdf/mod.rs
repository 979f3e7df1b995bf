//! Line shapes for tag-and-probe fits.
//!
//! Every shape comes in three layers:
//! - a `Copy` parameter snapshot with a pure, allocation-free `value(x)`: the raw,
//!   unnormalized density. It never fails; degenerate parameters give non-finite values.
//! - a bound object implementing [`BoundShape`], holding [`Param`] handles that a fitting
//!   host owns and mutates between evaluations.
//! - a normalized [`UnbinnedPdf`] over an [`EventStore`] observable, used by likelihood models.

use crate::event_store::{EventStore, ObservableSpec};
use crate::normalize::{NormalizationConfig, integrate_piecewise, sample_inverse_cdf};
use crate::param::Param;
use std::fmt;
use tnp_core::{Error, Result};

mod bernstein;
mod cb_ex_gauss;
mod cms_shape;
mod gauss_bern;
mod mod_dscb;

pub use bernstein::BernsteinPdf;
pub use cb_ex_gauss::{CbExGauss, CbExGaussParams, CbExGaussPdf, CbExGaussVars};
pub use cms_shape::{CmsShape, CmsShapeParams, CmsShapePdf, CmsShapeVars};
pub use gauss_bern::{
    CoefficientSource, GaussBern, GaussBernCore, GaussBernPdf, GaussBernVars, Side,
    basis_coefficient, bernstein_tail, expand_coefficients, gauss_bern,
};
pub use mod_dscb::{ModDscb, ModDscbParams, ModDscbPdf, ModDscbVars, mod_dscb};

/// A shape bound to externally owned parameter cells.
///
/// `evaluate` re-reads every cell on each call and returns the unnormalized density at the
/// observable's current value. Normalization is left to the host.
pub trait BoundShape: Send + Sync + fmt::Debug {
    /// Identity of this instance.
    fn name(&self) -> &str;

    /// The observable cell; its bounds are the fit domain.
    fn observable(&self) -> &Param;

    /// Parameter handles in constructor order (observable excluded).
    fn parameters(&self) -> Vec<Param>;

    /// Unnormalized density at an explicit observable value, current parameter values.
    fn evaluate_at(&self, x: f64) -> f64;

    /// Unnormalized density at the observable's current value.
    fn evaluate(&self) -> f64 {
        self.evaluate_at(self.observable().value())
    }

    /// Independent copy under a new name, bound to the same cells.
    fn clone_as(&self, name: &str) -> Box<dyn BoundShape>;
}

/// Trait for normalized PDFs used in event-level likelihoods.
///
/// Implementors provide the raw shape; normalization on the observable bounds, batch
/// log-densities, finite-difference gradients and sampling come from the provided methods.
pub trait UnbinnedPdf: Send + Sync {
    /// Number of shape parameters.
    fn n_params(&self) -> usize;

    /// Shape parameter names (stable order).
    fn param_names(&self) -> Vec<String>;

    /// Observable names required by this PDF. All shapes here are 1D.
    fn observables(&self) -> &[String];

    /// Unnormalized density at `x` for `params` on the domain `bounds`.
    fn shape_value(&self, x: f64, params: &[f64], bounds: (f64, f64)) -> f64;

    /// Points where the shape switches region; the normalization integral is split there.
    fn breakpoints(&self, _params: &[f64], _bounds: (f64, f64)) -> Vec<f64> {
        Vec::new()
    }

    /// Quadrature settings for [`UnbinnedPdf::log_normalization`].
    fn normalization_config(&self) -> NormalizationConfig {
        NormalizationConfig::default()
    }

    /// Check the parameter vector before evaluation.
    ///
    /// The default requires the right length and finite values.
    fn validate_params(&self, params: &[f64]) -> Result<()> {
        validate_len_and_finite("UnbinnedPdf", self.n_params(), params)
    }

    /// `log ∫ f(x) dx` over `bounds`.
    fn log_normalization(&self, params: &[f64], bounds: (f64, f64)) -> Result<f64> {
        let cfg = self.normalization_config();
        let breaks = self.breakpoints(params, bounds);
        let z = integrate_piecewise(|x| self.shape_value(x, params, bounds), bounds, &breaks, &cfg);
        if !z.is_finite() || z <= 0.0 {
            return Err(Error::Computation(format!(
                "normalization integral is not finite/positive: {z} on ({}, {})",
                bounds.0, bounds.1
            )));
        }
        Ok(z.ln())
    }

    /// Evaluate `log p(x | params)` for all events in the store.
    ///
    /// `out` must have length `events.n_events()`. A zero density gives `-inf`; a negative or
    /// NaN density is an error.
    fn log_prob_batch(&self, events: &EventStore, params: &[f64], out: &mut [f64]) -> Result<()> {
        self.validate_params(params)?;
        let n = events.n_events();
        if out.len() != n {
            return Err(Error::Validation(format!(
                "out length mismatch: expected {n}, got {}",
                out.len()
            )));
        }
        let (xs, bounds) = observable_column(self.observables(), events)?;
        let log_z = self.log_normalization(params, bounds)?;
        for (i, &x) in xs.iter().enumerate() {
            out[i] = log_density(self.shape_value(x, params, bounds), log_z, i, x)?;
        }
        Ok(())
    }

    /// Evaluate `log p(x|params)` and its gradient w.r.t. the shape parameters.
    ///
    /// - `out_logp` must have length `events.n_events()`.
    /// - `out_grad` must have length `events.n_events() * self.n_params()`, row-major
    ///   `[event0_param0, event0_param1, ..., event1_param0, ...]`.
    ///
    /// Derivatives are central differences of both the shape and the normalization. A
    /// component whose difference is not finite (e.g. the event sits where the density is
    /// zero) is reported as 0.
    fn log_prob_grad_batch(
        &self,
        events: &EventStore,
        params: &[f64],
        out_logp: &mut [f64],
        out_grad: &mut [f64],
    ) -> Result<()> {
        self.log_prob_batch(events, params, out_logp)?;

        let n = events.n_events();
        let n_params = self.n_params();
        if out_grad.len() != n * n_params {
            return Err(Error::Validation(format!(
                "out_grad length mismatch: expected {}, got {}",
                n * n_params,
                out_grad.len()
            )));
        }
        let (xs, bounds) = observable_column(self.observables(), events)?;

        let mut plus = params.to_vec();
        let mut minus = params.to_vec();
        for j in 0..n_params {
            let eps = 1e-6 * params[j].abs().max(1.0);
            plus[j] = params[j] + eps;
            minus[j] = params[j] - eps;
            let dlogz = match (
                self.log_normalization(&plus, bounds),
                self.log_normalization(&minus, bounds),
            ) {
                (Ok(zp), Ok(zm)) => (zp - zm) / (2.0 * eps),
                _ => 0.0,
            };
            for (i, &x) in xs.iter().enumerate() {
                let fp = self.shape_value(x, &plus, bounds);
                let fm = self.shape_value(x, &minus, bounds);
                let dlogf = (fp.ln() - fm.ln()) / (2.0 * eps);
                let g = dlogf - dlogz;
                out_grad[i * n_params + j] = if g.is_finite() { g } else { 0.0 };
            }
            plus[j] = params[j];
            minus[j] = params[j];
        }
        Ok(())
    }

    /// Draw `n_events` toy events on `support` by numerical inverse-CDF sampling.
    fn sample(
        &self,
        params: &[f64],
        n_events: usize,
        support: (f64, f64),
        rng: &mut dyn rand::RngCore,
    ) -> Result<EventStore> {
        self.validate_params(params)?;
        let (a, b) = support;
        if !(a.is_finite() && b.is_finite() && a < b) {
            return Err(Error::Validation(format!(
                "sample requires finite support with low < high, got ({a}, {b})"
            )));
        }
        let xs = sample_inverse_cdf(|x| self.shape_value(x, params, support), support, 4096, n_events, rng)
            .ok_or_else(|| {
                Error::Computation("sample failed: numerical integral is non-positive".into())
            })?;
        let name = self.observables()[0].clone();
        EventStore::from_columns(vec![ObservableSpec::new(name.clone(), support)], vec![(name, xs)], None)
    }
}

pub(crate) fn validate_len_and_finite(what: &str, expected: usize, params: &[f64]) -> Result<()> {
    if params.len() != expected {
        return Err(Error::Validation(format!(
            "{what} expects {expected} params, got {}",
            params.len()
        )));
    }
    if let Some(i) = params.iter().position(|p| !p.is_finite()) {
        return Err(Error::Validation(format!(
            "{what} params must be finite, got {} at index {i}",
            params[i]
        )));
    }
    Ok(())
}

fn observable_column<'a>(
    observables: &[String],
    events: &'a EventStore,
) -> Result<(&'a [f64], (f64, f64))> {
    let obs = observables
        .first()
        .ok_or_else(|| Error::Validation("PDF declares no observable".into()))?;
    events.column_with_bounds(obs)
}

#[inline]
fn log_density(f: f64, log_z: f64, i_evt: usize, x: f64) -> Result<f64> {
    if f.is_nan() || f < 0.0 {
        return Err(Error::Computation(format!(
            "shape is negative/NaN at data event {i_evt}: f={f} (x={x})"
        )));
    }
    Ok(f.ln() - log_z)
}
