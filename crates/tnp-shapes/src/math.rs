//! Numerical building blocks shared by the line shapes.

/// Gaussian core `exp(-t²/2)` at normalized distance `t`.
#[inline(always)]
pub fn gaussian_core(t: f64) -> f64 {
    (-0.5 * t * t).exp()
}

/// Effective second tail exponent: `max(n1, n2)`.
///
/// Two blended power laws with swapped exponents describe the same curve, which gives the
/// likelihood two mirror minima. Forcing the second exponent to be at least the first removes
/// the duplicate. The clamp is silent; in the clamped regime the two exponents are no longer
/// separately identifiable.
#[inline(always)]
pub fn effective_exponent(n1: f64, n2: f64) -> f64 {
    // `if` rather than `f64::max`: a NaN `n2` must not be swallowed.
    if n2 < n1 { n1 } else { n2 }
}

/// Crystal-Ball power-law tail at outward distance `t` (in sigma units, `t >= |alpha|`).
///
/// Amplitude and offset match the Gaussian core's value and slope at `t = |alpha|`:
///
/// `A (B + t)^{-n}`, `A = (n/|α|)^n exp(-α²/2)`, `B = n/|α| - |α|`.
///
/// Evaluated as `exp(-α²/2 + n ln((n/|α|) / (B + t)))` so that `(n/|α|)^n` cannot overflow
/// for steep tails. At `n = 0` the tail is flat at the anchor `exp(-α²/2)`.
#[inline(always)]
pub fn power_law_tail(t: f64, alpha: f64, n: f64) -> f64 {
    let abs_alpha = alpha.abs();
    if n == 0.0 {
        return gaussian_core(abs_alpha);
    }
    let n_over_a = n / abs_alpha;
    let b = n_over_a - abs_alpha;
    (-0.5 * abs_alpha * abs_alpha + n * (n_over_a / (b + t)).ln()).exp()
}

/// Binomial coefficient `C(n, k)` as `f64`.
pub fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut c = 1.0f64;
    for i in 0..k {
        c = c * (n - i) as f64 / (i + 1) as f64;
    }
    c
}

/// Monomial Bernstein term `t^i (1-t)^(n-i)` (no binomial weight).
#[inline(always)]
pub fn bernstein_monomial(t: f64, i: usize, n: usize) -> f64 {
    debug_assert!(i <= n);
    t.powi(i as i32) * (1.0 - t).powi((n - i) as i32)
}

/// Numerically stable `log Σ exp(x_i)`. Empty or all `-inf` input gives `-inf`.
pub fn logsumexp(xs: &[f64]) -> f64 {
    let m = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return m;
    }
    m + xs.iter().map(|&x| (x - m).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_power_law_matches_core_at_threshold() {
        for &(alpha, n) in &[(1.5, 1.0), (0.7, 3.0), (2.2, 12.0), (1.0, 0.5)] {
            let at = power_law_tail(alpha, alpha, n);
            assert_relative_eq!(at, gaussian_core(alpha), max_relative = 1e-14);
        }
    }

    #[test]
    fn test_power_law_slope_matches_core() {
        let (alpha, n) = (1.3f64, 2.5f64);
        let h = 1e-6;
        let d_tail = (power_law_tail(alpha + h, alpha, n) - power_law_tail(alpha, alpha, n)) / h;
        // d/dt exp(-t²/2) = -t exp(-t²/2)
        let d_core = -alpha * gaussian_core(alpha);
        assert_relative_eq!(d_tail, d_core, max_relative = 1e-4);
    }

    #[test]
    fn test_power_law_matches_direct_formula() {
        let (alpha, n, t) = (1.5f64, 2.0f64, 3.7f64);
        let a = (n / alpha).powf(n) * (-0.5 * alpha * alpha).exp();
        let b = n / alpha - alpha;
        assert_relative_eq!(power_law_tail(t, alpha, n), a * (b + t).powf(-n), max_relative = 1e-13);
    }

    #[test]
    fn test_power_law_zero_exponent_is_flat_anchor() {
        // A (B + t)^{-n} with pow semantics: pow(0, 0) = 1.
        let direct = |t: f64, alpha: f64, n: f64| {
            let a = alpha.abs();
            (n / a).powf(n) * (-0.5 * a * a).exp() * (n / a - a + t).powf(-n)
        };
        for &t in &[1.5, 2.0, 5.5, 40.0] {
            let v = power_law_tail(t, 1.5, 0.0);
            assert!(v.is_finite());
            assert_relative_eq!(v, direct(t, 1.5, 0.0), max_relative = 1e-14);
            assert_relative_eq!(v, gaussian_core(1.5), max_relative = 1e-14);
        }
        for &n in &[1e-3, 0.5, 2.0, 7.0] {
            assert_relative_eq!(power_law_tail(4.0, -1.5, n), direct(4.0, -1.5, n), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_power_law_steep_tail_stays_finite() {
        // (n/|α|)^n = 2000^200 overflows f64 when computed directly.
        let v = power_law_tail(0.2, 0.1, 200.0);
        assert!(v.is_finite());
        assert_relative_eq!(v, gaussian_core(0.1) * (2000.0f64 / 2000.1).powf(200.0), max_relative = 1e-10);
    }

    #[test]
    fn test_negative_alpha_uses_magnitude() {
        assert_eq!(power_law_tail(2.0, -1.5, 3.0), power_law_tail(2.0, 1.5, 3.0));
    }

    #[test]
    fn test_effective_exponent() {
        assert_eq!(effective_exponent(5.0, 2.0), 5.0);
        assert_eq!(effective_exponent(2.0, 5.0), 5.0);
        assert_eq!(effective_exponent(3.0, 3.0), 3.0);
        assert!(effective_exponent(3.0, f64::NAN).is_nan());
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(4, 0), 1.0);
        assert_eq!(binomial(4, 2), 6.0);
        assert_eq!(binomial(10, 3), 120.0);
        assert_eq!(binomial(3, 5), 0.0);
    }

    #[test]
    fn test_bernstein_monomial_endpoints() {
        assert_eq!(bernstein_monomial(0.0, 0, 3), 1.0);
        assert_eq!(bernstein_monomial(0.0, 1, 3), 0.0);
        assert_eq!(bernstein_monomial(1.0, 3, 3), 1.0);
        assert_eq!(bernstein_monomial(1.0, 2, 3), 0.0);
        assert_eq!(bernstein_monomial(0.3, 0, 0), 1.0);
    }

    #[test]
    fn test_logsumexp() {
        assert_relative_eq!(logsumexp(&[0.0, 0.0]), 2.0f64.ln(), epsilon = 1e-15);
        assert_relative_eq!(logsumexp(&[1000.0, 1000.0]), 1000.0 + 2.0f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(logsumexp(&[f64::NEG_INFINITY, 3.0]), 3.0, epsilon = 1e-15);
        assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
        assert_eq!(logsumexp(&[f64::NEG_INFINITY; 2]), f64::NEG_INFINITY);
    }
}
