/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Bootstrap aggregation: the BCa (bias-corrected and accelerated)
//! percentile bootstrap, used two ways by the orchestrator:
//!
//! - **Entropy-level** (`bootstrap_assessments`): bounds each
//!   estimator's *entropy* across blocks, then takes the min-of-minima.
//! - **Parameter-level** (`bootstrap_parameters`): bounds each
//!   estimator's underlying *probability parameter* across blocks (one
//!   sided, 0.995 confidence) and re-applies that estimator's own
//!   `-log2(...)` transform, rather than bounding the already-derived
//!   entropy a second time.
//!
//! Both modes share the same BCa core (`bca_core`): resample the data
//! with replacement `B` times, bias-correct from the fraction of
//! replicates below the observed statistic, and accelerate from
//! jackknife influence values.

use crate::config::EstimatorConfig;
use crate::consts::{BOOTSTRAP_MIN_BLOCKS_FOR_PARAMS, BOOTSTRAP_PARAM_CONFIDENCE, BOOTSTRAP_PERCENTILE_MARKOV};
use crate::errors::{err_exit_code, ExitCode};
use crate::numeric::{inverse_normal_cdf, mean_stddev, normal_cdf, percentile_sorted, KahanSum};
use crate::rng::Rng;
use anyhow::Result;

/// Mean of `values`, via the Kahan-compensated summation the design
/// notes require for bootstrap reductions (naive `.sum()` folds are not
/// used here - resampled means are exactly the kind of scalar chain
/// reduction that can cancel badly at `B = 15000` rounds).
fn compensated_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().copied().collect::<KahanSum>().total() / values.len() as f64
}

/// The shared bootstrap core: `B` resamples of `data`'s mean, the
/// bias-correction `z0`, and the jackknife acceleration `a`. Returns the
/// *sorted* bootstrap replicate distribution alongside `(z0, a)` so
/// callers can look up whatever adjusted percentile they need.
fn bca_core(data: &[f64], rounds: usize, rng: &mut Rng) -> (Vec<f64>, f64, f64) {
    let n = data.len();
    let theta_hat = compensated_mean(data);

    let mut replicates = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let resample: Vec<f64> = (0..n).map(|_| data[rng.random_range(n)]).collect();
        replicates.push(compensated_mean(&resample));
    }

    let below = replicates.iter().filter(|&&r| r < theta_hat).count();
    // half-counting ties, matching the usual BCa convention, keeps z0
    // finite when the bootstrap distribution is symmetric around theta_hat
    let tied = replicates.iter().filter(|&&r| r == theta_hat).count();
    let proportion = (below as f64 + 0.5 * tied as f64) / rounds as f64;
    let z0 = inverse_normal_cdf(proportion.clamp(1.0 / (rounds as f64 + 1.0), rounds as f64 / (rounds as f64 + 1.0)));

    let mut jackknife = Vec::with_capacity(n);
    for i in 0..n {
        let mut without_i = Vec::with_capacity(n - 1);
        without_i.extend_from_slice(&data[..i]);
        without_i.extend_from_slice(&data[i + 1..]);
        jackknife.push(compensated_mean(&without_i));
    }
    let jackknife_mean = compensated_mean(&jackknife);

    let mut num = 0.0;
    let mut den = 0.0;
    for &theta_i in &jackknife {
        let d = jackknife_mean - theta_i;
        num += d * d * d;
        den += d * d;
    }
    let a = if den > 0.0 {
        num / (6.0 * den.powf(1.5))
    } else {
        0.0
    };

    let mut sorted = replicates;
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    (sorted, z0, a)
}

/// Adjusts a nominal percentile `p` by the BCa correction `(z0, a)`,
/// clamping the jackknife term's denominator away from zero (an
/// unbiased, unaccelerated sample degenerates to the plain percentile
/// method).
fn bca_adjusted_percentile(p: f64, z0: f64, a: f64) -> f64 {
    let z_p = inverse_normal_cdf(p);
    let denom = 1.0 - a * (z0 + z_p);
    if denom.abs() < f64::EPSILON {
        return normal_cdf(z0 + z_p);
    }
    normal_cdf(z0 + (z0 + z_p) / denom)
}

/// One-sided BCa bound at nominal percentile `p` over `data`, using
/// `config.bootstrap_rounds` resamples. This is the primitive behind
/// both `bootstrap_assessments` and `bootstrap_parameters` - neither
/// needs a two-sided interval, just "the value at this (bias-corrected,
/// accelerated) percentile of the bootstrap distribution of the mean".
pub fn bca_bound(data: &[f64], p: f64, config: &EstimatorConfig, rng: &mut Rng) -> Result<f64> {
    if data.is_empty() {
        return err_exit_code(ExitCode::Unsupported, "bca_bound: empty sample");
    }
    if data.len() == 1 {
        return Ok(data[0]);
    }

    let (sorted, z0, a) = bca_core(data, config.bootstrap_rounds, rng);
    let adjusted = bca_adjusted_percentile(p, z0, a).clamp(0.0, 1.0);
    Ok(percentile_sorted(&sorted, adjusted))
}

/// Two-sided BCa confidence interval at `confidence` (e.g. 0.99), or
/// `None` ("no confidence interval") if the endpoints collapse to a
/// single point within `f64::EPSILON` - the degenerate case of a
/// perfectly constant `data` (or a pathologically concentrated
/// bootstrap distribution).
pub fn bca_confidence_interval(
    data: &[f64],
    confidence: f64,
    config: &EstimatorConfig,
    rng: &mut Rng,
) -> Result<Option<(f64, f64)>> {
    if data.is_empty() {
        return err_exit_code(ExitCode::Unsupported, "bca_confidence_interval: empty sample");
    }
    if data.len() == 1 {
        return Ok(None);
    }

    let (sorted, z0, a) = bca_core(data, config.bootstrap_rounds, rng);

    let alpha = (1.0 - confidence) / 2.0;
    let lower_p = bca_adjusted_percentile(alpha, z0, a).clamp(0.0, 1.0);
    let upper_p = bca_adjusted_percentile(1.0 - alpha, z0, a).clamp(0.0, 1.0);

    let lower = percentile_sorted(&sorted, lower_p);
    let upper = percentile_sorted(&sorted, upper_p);

    if (upper - lower).abs() < f64::EPSILON {
        Ok(None)
    } else {
        Ok(Some((lower, upper)))
    }
}

/// Per-estimator entropy-level bootstrap bound, keyed the same way as
/// `BlockResult::entropies()`.
#[derive(Debug, Clone)]
pub struct EntropyBootstrapResult {
    pub per_estimator: Vec<(&'static str, f64)>,
    /// The min-of-minima across all bounded estimators, clipped to
    /// `[0, bit_width]`.
    pub aggregate_entropy: f64,
}

/// Entropy-level bootstrap (`bootstrapAssessments`): for each estimator
/// with at least one per-block entropy result, BCa-bound the sequence
/// of per-block entropies (percentile 0.5 for every estimator except
/// Markov, which uses 0.005 - an intentional, preserved asymmetry, see
/// `DESIGN.md`), clipped to `[0, bit_width]`; the aggregate is the
/// min-of-minima across estimators.
pub fn bootstrap_assessments(
    per_block_entropies: &[Vec<(&'static str, bool, f64)>],
    bit_width: f64,
    config: &EstimatorConfig,
    rng: &mut Rng,
) -> Result<EntropyBootstrapResult> {
    if per_block_entropies.is_empty() {
        return err_exit_code(ExitCode::Unsupported, "bootstrap_assessments: no blocks");
    }

    let names: Vec<&'static str> = per_block_entropies[0].iter().map(|&(name, _, _)| name).collect();

    let mut per_estimator = Vec::with_capacity(names.len());
    for (idx, &name) in names.iter().enumerate() {
        let values: Vec<f64> = per_block_entropies
            .iter()
            .filter_map(|block| {
                let &(_, done, entropy) = &block[idx];
                done.then_some(entropy)
            })
            .collect();

        if values.is_empty() {
            continue;
        }

        let percentile = if name == "markov" {
            BOOTSTRAP_PERCENTILE_MARKOV
        } else {
            crate::consts::BOOTSTRAP_PERCENTILE_DEFAULT
        };

        let bound = bca_bound(&values, percentile, config, rng)?.clamp(0.0, bit_width);
        per_estimator.push((name, bound));
    }

    if per_estimator.is_empty() {
        return err_exit_code(ExitCode::Unsupported, "bootstrap_assessments: no estimator produced a result");
    }

    let aggregate_entropy = per_estimator
        .iter()
        .map(|&(_, e)| e)
        .fold(f64::INFINITY, f64::min)
        .clamp(0.0, bit_width);

    Ok(EntropyBootstrapResult {
        per_estimator,
        aggregate_entropy,
    })
}

/// Parameter-level bootstrap (`bootstrapParameters`): bounds a single
/// estimator's underlying probability parameter (one-sided, 0.995
/// confidence) across blocks, then re-applies `entropy_from_param` - the
/// same `-log2(...)` transform the estimator itself uses - to the bound
/// rather than to the already-derived per-block entropy. Requires `>=
/// 200` blocks (SP 800-90B's minimum for statistically meaningful
/// parameter resampling); refuses otherwise via `ExitCode::Unsupported`.
pub fn bootstrap_parameter_bound<F>(
    per_block_params: &[f64],
    config: &EstimatorConfig,
    rng: &mut Rng,
    entropy_from_param: F,
) -> Result<f64>
where
    F: Fn(f64) -> f64,
{
    if per_block_params.len() < BOOTSTRAP_MIN_BLOCKS_FOR_PARAMS {
        return err_exit_code(
            ExitCode::Unsupported,
            "bootstrap_parameter_bound: fewer than 200 blocks",
        );
    }

    let bound = bca_bound(per_block_params, BOOTSTRAP_PARAM_CONFIDENCE, config, rng)?.clamp(0.0, 1.0);
    Ok(entropy_from_param(bound))
}

/// Re-derives a predictor's P_local from a bootstrapped P_global' bound
/// and the maximum observed run length across blocks.
pub fn bootstrap_predictor_entropy(
    p_global_prime_bound: f64,
    max_r_across_blocks: u64,
    n_total_predictions: u64,
    k: u16,
    bit_width: f64,
) -> f64 {
    let (_, p_local) = crate::predictor::p_local_bound(max_r_across_blocks, n_total_predictions.max(1));
    let floor = 1.0 / k as f64;
    let dominant = floor.max(p_global_prime_bound).max(p_local);
    (-dominant.log2()).clamp(0.0, bit_width)
}

/// Mean and standard deviation of per-block values, exposed for callers
/// (the orchestrator's report writer) that want simple descriptive
/// statistics alongside the bootstrap bound, without re-deriving them.
pub fn describe(values: &[f64]) -> (f64, f64) {
    mean_stddev(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EstimatorConfig {
        EstimatorConfig::builder().deterministic(11).bootstrap_rounds(2000).build()
    }

    #[test]
    fn bca_bound_of_constant_data_is_that_constant() {
        let data = vec![0.5; 50];
        let config = test_config();
        let mut rng = Rng::from_seed(config.seed);
        let bound = bca_bound(&data, 0.5, &config, &mut rng).unwrap();
        assert!((bound - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bca_confidence_interval_widens_with_spread() {
        let tight: Vec<f64> = (0..100).map(|i| 1.0 + (i as f64) * 1e-6).collect();
        let wide: Vec<f64> = (0..100).map(|i| (i as f64) * 0.01).collect();
        let config = test_config();

        let mut rng_tight = Rng::from_seed(config.seed);
        let mut rng_wide = Rng::from_seed(config.seed);

        let ci_tight = bca_confidence_interval(&tight, 0.99, &config, &mut rng_tight).unwrap();
        let ci_wide = bca_confidence_interval(&wide, 0.99, &config, &mut rng_wide).unwrap();

        let width = |ci: Option<(f64, f64)>| ci.map(|(l, u)| u - l).unwrap_or(0.0);
        assert!(width(ci_tight) < width(ci_wide));
    }

    #[test]
    fn bca_confidence_interval_collapses_for_degenerate_data() {
        let data = vec![3.0; 20];
        let config = test_config();
        let mut rng = Rng::from_seed(config.seed);
        let ci = bca_confidence_interval(&data, 0.99, &config, &mut rng).unwrap();
        assert!(ci.is_none());
    }

    #[test]
    fn bootstrap_assessments_takes_min_of_minima() {
        let per_block: Vec<Vec<(&'static str, bool, f64)>> = (0..10)
            .map(|i| {
                vec![
                    ("mcv", true, 1.5 + (i as f64) * 0.001),
                    ("collision", true, 0.5),
                    ("markov", true, 0.3),
                ]
            })
            .collect();
        let config = test_config();
        let mut rng = Rng::from_seed(config.seed);

        let result = bootstrap_assessments(&per_block, 2.0, &config, &mut rng).unwrap();
        assert!(result.aggregate_entropy <= 0.5 + 1e-6);
    }

    #[test]
    fn bootstrap_parameter_bound_refuses_fewer_than_200_blocks() {
        let params = vec![0.5; 50];
        let config = test_config();
        let mut rng = Rng::from_seed(config.seed);
        let r = bootstrap_parameter_bound(&params, &config, &mut rng, |p| -p.log2());
        assert!(r.is_err());
    }

    #[test]
    fn bootstrap_parameter_bound_applies_supplied_transform() {
        let params = vec![0.25; 250];
        let config = test_config();
        let mut rng = Rng::from_seed(config.seed);
        let entropy = bootstrap_parameter_bound(&params, &config, &mut rng, |p| -p.log2()).unwrap();
        assert!((entropy - 2.0).abs() < 1e-6, "{}", entropy);
    }
}
