//! Numerical normalization of unnormalized shapes on a bounded observable range.
//!
//! Shapes here are piecewise (Gaussian core stitched to tails), so the integral is split at
//! the stitch points and each segment is integrated with composite Gauss-Legendre.

use std::sync::OnceLock;

/// Settings for composite Gauss-Legendre normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationConfig {
    /// Total number of panels distributed over the integration range.
    pub panels: usize,
    /// Gauss-Legendre order used inside every panel.
    pub order: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self { panels: 48, order: 16 }
    }
}

/// Gauss-Legendre nodes and weights on `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct QuadratureRule {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl QuadratureRule {
    /// Build the `n`-point rule by Newton iteration on `P_n`.
    pub fn gauss_legendre(n: usize) -> Self {
        let n = n.max(1);
        let mut nodes = vec![0.0f64; n];
        let mut weights = vec![0.0f64; n];
        let nf = n as f64;
        for i in 0..n.div_ceil(2) {
            let mut z = (std::f64::consts::PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
            let mut pp = 1.0f64;
            for _ in 0..100 {
                let mut p1 = 1.0f64;
                let mut p2 = 0.0f64;
                for j in 1..=n {
                    let p3 = p2;
                    p2 = p1;
                    let jf = j as f64;
                    p1 = ((2.0 * jf - 1.0) * z * p2 - (jf - 1.0) * p3) / jf;
                }
                pp = nf * (z * p1 - p2) / (z * z - 1.0);
                let z_prev = z;
                z = z_prev - p1 / pp;
                if (z - z_prev).abs() < 1e-15 {
                    break;
                }
            }
            let w = 2.0 / ((1.0 - z * z) * pp * pp);
            nodes[i] = -z;
            nodes[n - 1 - i] = z;
            weights[i] = w;
            weights[n - 1 - i] = w;
        }
        Self { nodes, weights }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a rule has at least one node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes on `[-1, 1]`.
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Weights (sum to 2).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// `∫_a^b f(x) dx` with a single panel.
    #[inline]
    pub fn integrate<F: Fn(f64) -> f64>(&self, f: &F, a: f64, b: f64) -> f64 {
        let half = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        let mut acc = 0.0f64;
        for (&t, &w) in self.nodes.iter().zip(&self.weights) {
            acc += w * f(mid + half * t);
        }
        acc * half
    }

    /// `∫_a^b f(x) dx` split into `panels` equal panels.
    pub fn integrate_composite<F: Fn(f64) -> f64>(
        &self,
        f: &F,
        a: f64,
        b: f64,
        panels: usize,
    ) -> f64 {
        let panels = panels.max(1);
        let h = (b - a) / panels as f64;
        (0..panels)
            .map(|k| {
                let lo = a + h * k as f64;
                self.integrate(f, lo, lo + h)
            })
            .sum()
    }
}

fn default_rule() -> &'static QuadratureRule {
    static RULE: OnceLock<QuadratureRule> = OnceLock::new();
    RULE.get_or_init(|| QuadratureRule::gauss_legendre(NormalizationConfig::default().order))
}

/// `∫_a^b f(x) dx`, split at the given breakpoints.
///
/// Breakpoints outside `(a, b)` or non-finite are ignored. Panels are shared between segments
/// in proportion to their length, with at least one panel per segment.
pub fn integrate_piecewise<F: Fn(f64) -> f64>(
    f: F,
    (a, b): (f64, f64),
    breakpoints: &[f64],
    config: &NormalizationConfig,
) -> f64 {
    let owned;
    let rule = if config.order == NormalizationConfig::default().order {
        default_rule()
    } else {
        owned = QuadratureRule::gauss_legendre(config.order);
        &owned
    };

    let mut edges: Vec<f64> = Vec::with_capacity(breakpoints.len() + 2);
    edges.push(a);
    edges.extend(breakpoints.iter().copied().filter(|&x| x.is_finite() && x > a && x < b));
    edges.push(b);
    edges.sort_by(f64::total_cmp);
    edges.dedup();

    let width = b - a;
    let mut total = 0.0f64;
    for seg in edges.windows(2) {
        let (lo, hi) = (seg[0], seg[1]);
        let share = ((hi - lo) / width * config.panels as f64).round() as usize;
        total += rule.integrate_composite(&f, lo, hi, share.max(1));
    }
    total
}

/// Draw `n` values from the density proportional to `f` on `[a, b]` by inverting a trapezoidal
/// CDF tabulated on `n_grid` points.
///
/// Returns `None` when the tabulated integral is not finite and positive.
pub fn sample_inverse_cdf<F: Fn(f64) -> f64>(
    f: F,
    (a, b): (f64, f64),
    n_grid: usize,
    n: usize,
    rng: &mut dyn rand::RngCore,
) -> Option<Vec<f64>> {
    #[inline]
    fn u01(rng: &mut dyn rand::RngCore) -> f64 {
        (rng.next_u64() as f64 + 0.5) * (1.0 / 18446744073709551616.0_f64)
    }

    let n_grid = n_grid.max(2);
    let dx = (b - a) / (n_grid as f64 - 1.0);
    let x_grid: Vec<f64> = (0..n_grid).map(|i| a + dx * i as f64).collect();
    let pdf_grid: Vec<f64> = x_grid
        .iter()
        .map(|&x| {
            let v = f(x);
            if v.is_finite() && v > 0.0 { v } else { 0.0 }
        })
        .collect();

    let mut cdf = vec![0.0; n_grid];
    for i in 1..n_grid {
        cdf[i] = cdf[i - 1] + 0.5 * (pdf_grid[i - 1] + pdf_grid[i]) * dx;
    }
    let total = cdf[n_grid - 1];
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    for v in &mut cdf {
        *v /= total;
    }

    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let u = u01(rng);
        let idx = cdf.partition_point(|&v| v < u);
        let x = if idx == 0 {
            x_grid[0]
        } else if idx >= n_grid {
            x_grid[n_grid - 1]
        } else {
            let (c0, c1) = (cdf[idx - 1], cdf[idx]);
            let (x0, x1) = (x_grid[idx - 1], x_grid[idx]);
            if c1 > c0 { x0 + (u - c0) * (x1 - x0) / (c1 - c0) } else { x0 }
        };
        out.push(x.clamp(a, b));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_weights_sum_to_two() {
        for n in [1, 2, 5, 16, 33] {
            let r = QuadratureRule::gauss_legendre(n);
            assert_eq!(r.len(), n);
            assert_relative_eq!(r.weights().iter().sum::<f64>(), 2.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn test_exact_for_polynomials_up_to_2n_minus_1() {
        let r = QuadratureRule::gauss_legendre(4);
        // ∫_0^2 x^7 dx = 2^8/8 = 32
        let v = r.integrate(&|x: f64| x.powi(7), 0.0, 2.0);
        assert_relative_eq!(v, 32.0, epsilon = 1e-11);
    }

    #[test]
    fn test_nodes_symmetric_and_sorted() {
        let r = QuadratureRule::gauss_legendre(7);
        let nodes = r.nodes();
        for i in 0..nodes.len() {
            assert_relative_eq!(nodes[i], -nodes[nodes.len() - 1 - i], epsilon = 1e-15);
        }
        assert!(nodes.windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(nodes[3], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_piecewise_handles_kink() {
        // |x| on [-1, 2] has a kink at 0: integral 0.5 + 2 = 2.5
        let cfg = NormalizationConfig { panels: 4, order: 8 };
        let v = integrate_piecewise(|x: f64| x.abs(), (-1.0, 2.0), &[0.0, 5.0, f64::NAN], &cfg);
        assert_relative_eq!(v, 2.5, epsilon = 1e-13);
    }

    #[test]
    fn test_piecewise_gaussian_integral() {
        let v = integrate_piecewise(
            |x: f64| (-0.5 * x * x).exp(),
            (-10.0, 10.0),
            &[],
            &NormalizationConfig::default(),
        );
        assert_relative_eq!(v, (2.0 * std::f64::consts::PI).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_sample_inverse_cdf_uniform_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let xs = sample_inverse_cdf(|_| 1.0, (2.0, 4.0), 256, 20_000, &mut rng).unwrap();
        assert!(xs.iter().all(|&x| (2.0..=4.0).contains(&x)));
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        assert_relative_eq!(mean, 3.0, epsilon = 0.02);
    }

    #[test]
    fn test_sample_inverse_cdf_rejects_zero_density() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_inverse_cdf(|_| 0.0, (0.0, 1.0), 64, 10, &mut rng).is_none());
    }
}
