/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Numeric kit: log2, the regularized incomplete beta function via
//! Lentz's continued fraction, a monotonic binary search helper,
//! Kahan-compensated summation, the binomial CDF, and the Hyndman-Fan
//! type-6 percentile used by the bootstrap.

use crate::consts::{BINARY_SEARCH_MAX_ITERATIONS, INCBETA_EPSILON, INCBETA_MAX_ITERATIONS, INCBETA_TINY};
use crate::errors::{err_exit_code, ExitCode};
use crate::here;
use anyhow::{Context, Result};

/// Kahan-compensated running sum. Plain `.sum()` folds are not used for
/// bootstrap jackknife values or collision/compression length sums,
/// which can cancel badly.
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    pub fn new() -> Self {
        KahanSum::default()
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.sum
    }
}

impl FromIterator<f64> for KahanSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = KahanSum::new();
        for v in iter {
            acc.add(v);
        }
        acc
    }
}

/// Compensated sample mean and (population) standard deviation.
pub fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().copied().collect::<KahanSum>().total() / n;

    let mut sq = KahanSum::new();
    for &v in values {
        let d = v - mean;
        sq.add(d * d);
    }
    let variance = sq.total() / n;

    (mean, variance.max(0.0).sqrt())
}

/// log2 via the standard library; kept as a named wrapper so call sites
/// read like the SP 800-90B formulas they implement.
#[inline]
pub fn log2(x: f64) -> f64 {
    x.log2()
}

/// Regularized incomplete beta function I_x(a, b), evaluated with
/// Lentz's continued fraction. Iteration cap and epsilon/tiny constants
/// are preserved literally from the public-domain reference this
/// algorithm is copied from (see `DESIGN.md`).
pub fn incomplete_beta(x: f64, a: f64, b: f64) -> Result<f64> {
    if x < 0.0 || x > 1.0 {
        return err_exit_code(ExitCode::NumericOverflow, "incomplete_beta: x out of [0,1]");
    }
    if x == 0.0 || x == 1.0 {
        return Ok(x);
    }

    // use the symmetry relation to keep the continued fraction in its
    // region of fast convergence
    if x > (a + 1.0) / (a + b + 2.0) {
        return incomplete_beta(1.0 - x, b, a).map(|v| 1.0 - v);
    }

    let lbeta_ab = ln_beta(a, b);
    let front = (a * x.ln() + b * (1.0 - x).ln() - lbeta_ab).exp() / a;

    let mut f = 1.0;
    let mut c = 1.0;
    let mut d = 0.0;

    for i in 0..INCBETA_MAX_ITERATIONS {
        let m = (i / 2) as f64;

        let numerator = if i == 0 {
            1.0
        } else if i % 2 == 0 {
            (m * (b - m) * x) / ((a + 2.0 * m - 1.0) * (a + 2.0 * m))
        } else {
            -((a + m) * (a + b + m) * x) / ((a + 2.0 * m) * (a + 2.0 * m + 1.0))
        };

        d = 1.0 + numerator * d;
        if d.abs() < INCBETA_TINY {
            d = INCBETA_TINY;
        }
        d = 1.0 / d;

        c = 1.0 + numerator / c;
        if c.abs() < INCBETA_TINY {
            c = INCBETA_TINY;
        }

        let cd = c * d;
        f *= cd;

        if (1.0 - cd).abs() < INCBETA_EPSILON {
            return Ok(front * (f - 1.0));
        }
    }

    err_exit_code(
        ExitCode::NonConvergence,
        "incomplete_beta: Lentz continued fraction did not converge",
    )
    .context(here!())
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Lanczos approximation to ln(Gamma(x)), sufficient precision for the
/// incbeta use above (x > 0 throughout this crate's call sites).
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection formula
        return (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut a = COEFFS[0];
    let t = x + G + 0.5;
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }

    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Binomial CDF P(X <= k) for X ~ Binomial(n, p), expressed via the
/// regularized incomplete beta identity.
pub fn binomial_cdf(k: u64, n: u64, p: f64) -> Result<f64> {
    if k >= n {
        return Ok(1.0);
    }
    if p <= 0.0 {
        return Ok(1.0);
    }
    if p >= 1.0 {
        return Ok(if k + 1 >= n { 1.0 } else { 0.0 });
    }

    incomplete_beta((n - k - 1) as f64, (k + 1) as f64, p).map(|v| 1.0 - v)
}

/// Finds the smallest `p` in `[lo, hi]` such that `predicate(p)` holds,
/// assuming `predicate` is monotonically false-then-true over the
/// interval. Used by Collision/Compression to invert their implicit
/// probability equations.
pub fn monotonic_search<F>(mut lo: f64, mut hi: f64, predicate: F) -> Result<f64>
where
    F: Fn(f64) -> bool,
{
    if lo > hi {
        return err_exit_code(ExitCode::GeneralFailure, "monotonic_search: lo > hi");
    }

    if predicate(lo) {
        return Ok(lo);
    }
    if !predicate(hi) {
        return Ok(hi);
    }

    for _ in 0..BINARY_SEARCH_MAX_ITERATIONS {
        let mid = lo + (hi - lo) / 2.0;
        if mid == lo || mid == hi {
            return Ok(hi);
        }
        if predicate(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    err_exit_code(
        ExitCode::NonConvergence,
        "monotonic_search: binary search did not converge",
    )
    .context(here!())
}

/// Standard normal CDF, via the Abramowitz & Stegun 7.1.26 erf
/// approximation (max error 1.5e-7). Used by the BCa bootstrap's
/// bias-correction step.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t) * (-x * x).exp();

    sign * y
}

/// Inverse standard normal CDF (quantile function), via Peter Acklam's
/// public-domain rational approximation. Used by the BCa bootstrap to
/// turn percentiles into z-scores and back.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Hyndman-Fan type-6 percentile (the default used by R's `quantile()`),
/// used by the BCa bootstrap over a pre-sorted sample.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty(), "percentile_sorted: empty sample");
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let p = p.clamp(0.0, 1.0);
    let h = (n as f64 + 1.0) * p;
    let h = h.clamp(1.0, n as f64);

    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;

    let lo_val = sorted[lo - 1];
    let hi_val = sorted[hi - 1];

    lo_val + frac * (hi_val - lo_val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kahan_sum_matches_naive_for_well_conditioned_input() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64 * 0.001).collect();
        let naive: f64 = values.iter().sum();
        let kahan: f64 = values.iter().copied().collect::<KahanSum>().total();
        assert!((naive - kahan).abs() < 1e-9);
    }

    #[test]
    fn incomplete_beta_matches_known_points() {
        // I_0.5(1,1) = 0.5 (uniform CDF)
        let v = incomplete_beta(0.5, 1.0, 1.0).unwrap();
        assert!((v - 0.5).abs() < 1e-9, "{}", v);

        // I_x(a,a) is symmetric around x=0.5
        let a = incomplete_beta(0.3, 2.0, 2.0).unwrap();
        let b = incomplete_beta(0.7, 2.0, 2.0).unwrap();
        assert!((a - (1.0 - b)).abs() < 1e-9);
    }

    #[test]
    fn monotonic_search_finds_threshold() {
        // predicate true for p >= 0.3
        let p = monotonic_search(0.0, 1.0, |x| x >= 0.3).unwrap();
        assert!((p - 0.3).abs() < 1e-6);
    }

    #[test]
    fn percentile_sorted_median_of_odd_sample() {
        let v = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let m = percentile_sorted(&v, 0.5);
        assert!((m - 3.0).abs() < 1e-9);
    }

    #[test]
    fn binomial_cdf_endpoints() {
        assert_eq!(binomial_cdf(9, 10, 0.5).unwrap() < 1.0, true);
        assert_eq!(binomial_cdf(10, 10, 0.5).unwrap(), 1.0);
    }

    #[test]
    fn normal_cdf_matches_known_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-9);
        assert!((normal_cdf(1.959964) - 0.975).abs() < 1e-4);
    }

    #[test]
    fn inverse_normal_cdf_is_normal_cdf_inverse() {
        for &p in &[0.01, 0.1, 0.5, 0.9, 0.995] {
            let z = inverse_normal_cdf(p);
            assert!((normal_cdf(z) - p).abs() < 1e-6, "p={} z={}", p, z);
        }
    }

    #[test]
    fn inverse_normal_cdf_at_995_matches_z995_constant() {
        use crate::consts::Z_995;
        let z = inverse_normal_cdf(0.995);
        assert!((z - Z_995).abs() < 1e-4, "{} vs {}", z, Z_995);
    }
}
