/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Orchestrator: drives the battery over one or more blocks,
//! aggregates results via the bootstrap, and applies the
//! min-of-minima rule. Health tests and restart sanity operate
//! independently on the raw or normalised stream and are intentionally
//! kept out of this per-block loop, but are exposed alongside it here
//! as the natural next layer up from the individual components, for a
//! driver binary to wire together.

use crate::bootstrap::{self, EntropyBootstrapResult};
use crate::config::EstimatorConfig;
use crate::consts::BOOTSTRAP_MIN_BLOCKS_FOR_PARAMS;
use crate::errors::{err_exit_code, ExitCode};
use crate::estimators::{self, BlockResult};
use crate::health::{Apt, CrossRct, Rct};
use crate::rng::Rng;
use crate::translate;
use anyhow::Result;

/// The full battery's result over the (possibly multi-block) input.
pub struct AssessmentResult {
    pub k: u16,
    pub bit_width: f64,
    pub blocks: Vec<BlockResult>,
    /// Entropy-level bootstrap (present once `blocks` is non-empty).
    pub entropy_bootstrap: EntropyBootstrapResult,
    /// Parameter-level bootstrap, one bound per estimator name; `None`
    /// unless `config.bootstrap_params` and `blocks.len() >= 200`.
    pub parameter_bootstrap: Option<Vec<(&'static str, f64)>>,
    /// The final reported min-entropy: the smaller of the entropy-level
    /// aggregate and (if present) the parameter-level aggregate, clipped
    /// to `[0, bit_width]`.
    pub assessed_min_entropy: f64,
    /// MCV-only entropy over the whole (unblocked) stream, reported
    /// separately when the caller asks for the IID-assumption track.
    pub iid_track_entropy: Option<f64>,
}

/// Runs translate once over the whole stream, splits it into blocks of
/// `block_len` samples (the final partial block, if any, is dropped -
/// SP 800-90B's estimators assume a full-length block), runs the
/// battery on each, and aggregates via bootstrap.
pub fn assess(
    raw: &[u64],
    block_len: usize,
    config: &EstimatorConfig,
    report_iid_track: bool,
    rng: &mut Rng,
) -> Result<AssessmentResult> {
    if block_len == 0 {
        return err_exit_code(ExitCode::Unsupported, "assess: block_len must be nonzero");
    }

    let translated = translate::translate(raw)?;
    let k = translated.k;
    let bit_width = (k as f64).log2();

    let num_blocks = translated.symbols.len() / block_len;
    if num_blocks == 0 {
        return err_exit_code(ExitCode::Unsupported, "assess: input shorter than one block");
    }

    let mut blocks = Vec::with_capacity(num_blocks);
    for i in 0..num_blocks {
        let block = &translated.symbols[i * block_len..(i + 1) * block_len];
        log::debug!("assessing block {}/{} ({} samples)", i + 1, num_blocks, block_len);
        let result = estimators::run_battery(block, k)?;

        #[cfg(feature = "detailed_tracing")]
        log::trace!("block {}/{} full result: {:?}", i + 1, num_blocks, result);

        blocks.push(result);
    }
    log::info!("ran battery over {} block(s), k={}", num_blocks, k);

    let per_block_entropies: Vec<_> = blocks.iter().map(|b| b.entropies()).collect();
    let entropy_bootstrap = bootstrap::bootstrap_assessments(&per_block_entropies, bit_width, config, rng)?;

    let parameter_bootstrap = if config.bootstrap_params && blocks.len() >= BOOTSTRAP_MIN_BLOCKS_FOR_PARAMS {
        log::info!("running parameter-level bootstrap over {} blocks", blocks.len());
        Some(bootstrap_parameters(&blocks, k, bit_width, config, rng)?)
    } else {
        if config.bootstrap_params {
            log::warn!(
                "bootstrap_params requested but only {} blocks available (need >= {})",
                blocks.len(),
                BOOTSTRAP_MIN_BLOCKS_FOR_PARAMS
            );
        }
        None
    };

    let mut assessed_min_entropy = entropy_bootstrap.aggregate_entropy;
    if let Some(params) = &parameter_bootstrap {
        let param_min = params.iter().map(|&(_, e)| e).fold(f64::INFINITY, f64::min);
        assessed_min_entropy = assessed_min_entropy.min(param_min);
    }
    assessed_min_entropy = assessed_min_entropy.clamp(0.0, bit_width);

    let iid_track_entropy = if report_iid_track {
        Some(estimators::mcv::estimate(&translated.symbols, k)?.entropy)
    } else {
        None
    };

    Ok(AssessmentResult {
        k,
        bit_width,
        blocks,
        entropy_bootstrap,
        parameter_bootstrap,
        assessed_min_entropy,
        iid_track_entropy,
    })
}

/// Parameter-level bootstrap `bootstrapParameters`): bounds each
/// estimator's own probability parameter across blocks (one-sided,
/// 0.995 confidence) and re-applies that estimator's `-log2(...)`
/// transform, rather than bounding the already-derived entropy again.
fn bootstrap_parameters(
    blocks: &[BlockResult],
    k: u16,
    bit_width: f64,
    config: &EstimatorConfig,
    rng: &mut Rng,
) -> Result<Vec<(&'static str, f64)>> {
    let entropy_from_p = |p: f64| (-p.log2()).clamp(0.0, bit_width);

    let mut out = Vec::new();

    let mcv_p: Vec<f64> = blocks.iter().filter(|b| b.mcv.done).map(|b| b.mcv.p_hat).collect();
    if let Ok(e) = bootstrap::bootstrap_parameter_bound(&mcv_p, config, rng, entropy_from_p) {
        out.push(("mcv", e));
    }

    let collision_p: Vec<f64> = blocks.iter().filter(|b| b.collision.done).map(|b| b.collision.p).collect();
    if let Ok(e) = bootstrap::bootstrap_parameter_bound(&collision_p, config, rng, entropy_from_p) {
        out.push(("collision", e));
    }

    let compression_p: Vec<f64> = blocks.iter().filter(|b| b.compression.done).map(|b| b.compression.p).collect();
    if let Ok(e) = bootstrap::bootstrap_parameter_bound(&compression_p, config, rng, entropy_from_p) {
        out.push(("compression", e));
    }

    let markov_p: Vec<f64> = blocks.iter().filter(|b| b.markov.done).map(|b| b.markov.p_max).collect();
    if let Ok(e) = bootstrap::bootstrap_parameter_bound(&markov_p, config, rng, entropy_from_p) {
        out.push(("markov", e));
    }

    let t_tuple_p: Vec<f64> = blocks
        .iter()
        .filter(|b| b.suffix_group.t_tuple_done)
        .map(|b| b.suffix_group.t_tuple_p_max)
        .collect();
    if let Ok(e) = bootstrap::bootstrap_parameter_bound(&t_tuple_p, config, rng, entropy_from_p) {
        out.push(("t_tuple", e));
    }

    let lrs_p: Vec<f64> = blocks
        .iter()
        .filter(|b| b.suffix_group.lrs_done)
        .map(|b| b.suffix_group.lrs_p_max)
        .collect();
    if let Ok(e) = bootstrap::bootstrap_parameter_bound(&lrs_p, config, rng, entropy_from_p) {
        out.push(("lrs", e));
    }

    for (name, selector) in [
        ("multi_mcw", (|b: &BlockResult| &b.multi_mcw) as fn(&BlockResult) -> &crate::predictor::PredictorResult),
        ("lag", |b: &BlockResult| &b.lag),
        ("multi_mmc", |b: &BlockResult| &b.multi_mmc),
        ("lz78y", |b: &BlockResult| &b.lz78y),
    ] {
        let done_blocks: Vec<&crate::predictor::PredictorResult> =
            blocks.iter().map(selector).filter(|p| p.done).collect();
        if done_blocks.is_empty() {
            continue;
        }

        let p_global: Vec<f64> = done_blocks.iter().map(|p| p.p_global).collect();
        let max_r = done_blocks.iter().map(|p| p.r).max().unwrap_or(0);
        let n_total: u64 = done_blocks.iter().map(|p| p.n).sum();

        if p_global.len() < BOOTSTRAP_MIN_BLOCKS_FOR_PARAMS {
            continue;
        }
        let p_global_bound = bootstrap::bca_bound(&p_global, crate::consts::BOOTSTRAP_PARAM_CONFIDENCE, config, rng)?
            .clamp(0.0, 1.0);
        let entropy = bootstrap::bootstrap_predictor_entropy(p_global_bound, max_r, n_total, k, bit_width);
        out.push((name, entropy));
    }

    if out.is_empty() {
        return err_exit_code(
            ExitCode::Unsupported,
            "bootstrap_parameters: no estimator had enough per-block parameters",
        );
    }

    Ok(out)
}

/// Runtime health-test results, run once over the full translated
/// stream independently of the block battery above.
pub struct HealthSummary {
    pub rct: Rct,
    pub apt: Apt,
    pub cross_rct: Option<CrossRct>,
}

impl HealthSummary {
    pub fn passed(&self) -> bool {
        self.rct.passed() && self.apt.passed() && self.cross_rct.as_ref().map_or(true, CrossRct::passed)
    }
}

/// Runs RCT and APT over `symbols` with `config`'s cutoffs, plus
/// Cross-RCT when `bits_per_symbol` is given (meaningful only when the
/// source is naturally bit-packed, e.g. a ring-oscillator sampler
/// upstream of this crate).
pub fn run_health_tests(symbols: &[u8], bits_per_symbol: Option<usize>, config: &EstimatorConfig) -> HealthSummary {
    let mut rct = Rct::new(config.rct_cutoff);
    let mut apt = Apt::new(config.apt_cutoff, config.apt_window);

    let mut cross_rct = bits_per_symbol.map(|bits| CrossRct::new(bits, config.rct_cutoff, config.rct_cutoff));

    for &sym in symbols {
        rct.update(sym);
        apt.update(sym);
        if let Some(cross) = cross_rct.as_mut() {
            cross.update(sym as u32);
        }
    }

    HealthSummary { rct, apt, cross_rct }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assesses_constant_stream_as_zero_entropy() {
        let raw = vec![0u64; 10_000];
        let config = EstimatorConfig::builder().deterministic(1).bootstrap_rounds(200).build();
        let mut rng = Rng::from_seed(config.seed);

        let result = assess(&raw, 5_000, &config, false, &mut rng).unwrap();
        assert_eq!(result.blocks.len(), 2);
        assert!(result.assessed_min_entropy < 1e-6, "{}", result.assessed_min_entropy);
    }

    #[test]
    fn rejects_input_shorter_than_one_block() {
        let raw = vec![0u64; 10];
        let config = EstimatorConfig::new();
        let mut rng = Rng::from_seed(1);
        assert!(assess(&raw, 100, &config, false, &mut rng).is_err());
    }

    #[test]
    fn reports_iid_track_when_requested() {
        let raw: Vec<u64> = (0..4000u64).map(|i| i % 2).collect();
        let config = EstimatorConfig::builder().deterministic(3).bootstrap_rounds(200).build();
        let mut rng = Rng::from_seed(config.seed);

        let result = assess(&raw, 2000, &config, true, &mut rng).unwrap();
        assert!(result.iid_track_entropy.is_some());
    }

    #[test]
    fn health_tests_pass_on_alternating_stream() {
        let symbols: Vec<u8> = (0..10_000u32).map(|i| (i % 2) as u8).collect();
        let config = EstimatorConfig::new();
        let summary = run_health_tests(&symbols, Some(1), &config);
        assert!(summary.passed());
    }

    #[test]
    fn health_tests_fail_on_constant_stream() {
        let symbols = vec![0u8; 10_000];
        let config = EstimatorConfig::new();
        let summary = run_health_tests(&symbols, None, &config);
        assert!(!summary.passed());
    }
}
