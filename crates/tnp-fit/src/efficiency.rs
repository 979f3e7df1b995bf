//! Efficiency extraction from pass/fail signal yields.

use serde::{Deserialize, Serialize};
use tnp_core::{Error, FitResult, Result};

/// A selection efficiency with its one-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    /// `P / (P + F)`.
    pub value: f64,
    /// Propagated uncertainty.
    pub uncertainty: f64,
}

impl Efficiency {
    /// Efficiency from fitted pass and fail signal yields and their uncertainties.
    ///
    /// `∂ε/∂P = ε(1-ε)/P` and `∂ε/∂F = -ε²/P`; the pass and fail fits are independent so the
    /// two terms add in quadrature. A bin with no passing signal gets `ε = 0` with uncertainty
    /// 1 and a warning.
    pub fn from_yields(n_pass: f64, n_pass_unc: f64, n_fail: f64, n_fail_unc: f64) -> Result<Self> {
        check_finite(&[n_pass, n_pass_unc, n_fail, n_fail_unc])?;
        if n_pass <= 0.0 {
            log::warn!("no passing signal (n_pass = {n_pass}); efficiency set to 0");
            return Ok(Self { value: 0.0, uncertainty: 1.0 });
        }
        Ok(Self { value: n_pass / (n_pass + n_fail), uncertainty: 0.0 }
            .with_propagated(n_pass, n_pass_unc, n_fail_unc))
    }

    /// Efficiency from pass and fail fits, reading the signal yield at `n_sig_index`.
    pub fn from_fits(pass: &FitResult, fail: &FitResult, n_sig_index: usize) -> Result<Self> {
        let read = |fit: &FitResult, leg: &str| -> Result<(f64, f64)> {
            match (fit.parameters.get(n_sig_index), fit.uncertainties.get(n_sig_index)) {
                (Some(&v), Some(&u)) => Ok((v, u)),
                _ => Err(Error::Validation(format!(
                    "{leg} fit has no parameter at index {n_sig_index}"
                ))),
            }
        };
        let (p, p_unc) = read(pass, "pass")?;
        let (f, f_unc) = read(fail, "fail")?;
        Self::from_yields(p, p_unc, f, f_unc)
    }

    /// Efficiency by counting, for samples that are all signal (e.g. simulation).
    ///
    /// Uncertainties are the counting errors of the two samples (e.g. `sqrt(Σ w²)`). A sample
    /// with no passing events gets `ε = 0` with uncertainty `1.5 / (P + F)`.
    pub fn cut_and_count(n_pass: f64, n_pass_unc: f64, n_fail: f64, n_fail_unc: f64) -> Result<Self> {
        check_finite(&[n_pass, n_pass_unc, n_fail, n_fail_unc])?;
        let total = n_pass + n_fail;
        if total <= 0.0 {
            return Err(Error::Validation(format!(
                "cut_and_count requires a positive total, got {total}"
            )));
        }
        if n_pass <= 0.0 {
            log::warn!("no passing events (n_pass = {n_pass}); efficiency set to 0");
            return Ok(Self { value: 0.0, uncertainty: 1.5 / total });
        }
        Ok(Self { value: n_pass / total, uncertainty: 0.0 }
            .with_propagated(n_pass, n_pass_unc, n_fail_unc))
    }

    fn with_propagated(self, n_pass: f64, n_pass_unc: f64, n_fail_unc: f64) -> Self {
        let eff = self.value;
        let d_pass = eff * (1.0 - eff) / n_pass;
        let d_fail = eff * eff / n_pass;
        Self { value: eff, uncertainty: (d_pass * n_pass_unc).hypot(d_fail * n_fail_unc) }
    }
}

/// One-sigma Wilson score interval for the pass probability.
pub fn wilson_interval(n_pass: f64, n_fail: f64) -> Result<(f64, f64)> {
    const Z: f64 = 1.0;
    check_finite(&[n_pass, n_fail])?;
    let n_total = n_pass + n_fail;
    if n_total <= 0.0 {
        return Err(Error::Validation(format!(
            "wilson_interval requires a positive total, got {n_total}"
        )));
    }
    let p = n_pass / n_total;
    let z2n = Z * Z / n_total;
    let centre = (p + 0.5 * z2n) / (1.0 + z2n);
    let half = Z * (p * (1.0 - p) / n_total + 0.25 * z2n / n_total).max(0.0).sqrt() / (1.0 + z2n);
    Ok((centre - half, centre + half))
}

fn check_finite(values: &[f64]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::Validation(format!("efficiency inputs must be finite, got {values:?}")))
    }
}
