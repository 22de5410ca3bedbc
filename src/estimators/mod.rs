/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! The ten SP 800-90B non-IID estimators, plus the per-block
//! aggregate record (`BlockResult`) the orchestrator collects one
//! of per block and hands to the bootstrap.

pub mod collision;
pub mod compression;
pub mod markov;
pub mod mcv;
pub mod suffix_group;

use crate::predictor::{self, Lag, Lz78y, MultiMcw, MultiMmc, Predictor, PredictorResult};
use anyhow::Result;

/// All per-estimator sub-records for a single block.
#[derive(Debug, Clone)]
pub struct BlockResult {
    pub mcv: mcv::McvResult,
    pub collision: collision::CollisionResult,
    pub markov: markov::MarkovResult,
    pub compression: compression::CompressionResult,
    pub suffix_group: suffix_group::SuffixGroupResult,
    pub multi_mcw: PredictorResult,
    pub lag: PredictorResult,
    pub multi_mmc: PredictorResult,
    pub lz78y: PredictorResult,
}

/// Runs every estimator in the battery once over `symbols` (a single,
/// already-translated block over alphabet `[0, k)`) and collects the
/// results. Estimator order does not affect results - each is a pure
/// function of `symbols` - so this runs them in a fixed, readable order
/// rather than any particular dependency order.
pub fn run_battery(symbols: &[u8], k: u16) -> Result<BlockResult> {
    let mcv = mcv::estimate(symbols, k)?;
    let collision = collision::estimate(symbols, k)?;
    let markov = markov::estimate(symbols, k)?;
    let compression = compression::estimate(symbols, k)?;
    let suffix_group = suffix_group::estimate(symbols, k)?;

    let mut multi_mcw_predictor = MultiMcw::new();
    let multi_mcw = predictor::run_predictor(&mut multi_mcw_predictor, symbols, k)?;

    let mut lag_predictor = Lag::new();
    let lag = predictor::run_predictor(&mut lag_predictor, symbols, k)?;

    let mut multi_mmc_predictor = MultiMmc::new(k)?;
    let multi_mmc = predictor::run_predictor(&mut multi_mmc_predictor, symbols, k)?;

    let mut lz78y_predictor = Lz78y::new(k)?;
    let lz78y = predictor::run_predictor(&mut lz78y_predictor, symbols, k)?;

    Ok(BlockResult {
        mcv,
        collision,
        markov,
        compression,
        suffix_group,
        multi_mcw,
        lag,
        multi_mmc,
        lz78y,
    })
}

impl BlockResult {
    /// Every `(name, done, entropy)` triple this block produced, in the
    /// fixed order used for both logging and the min-of-minima rule.
    pub fn entropies(&self) -> Vec<(&'static str, bool, f64)> {
        vec![
            ("mcv", self.mcv.done, self.mcv.entropy),
            ("collision", self.collision.done, self.collision.entropy),
            ("markov", self.markov.done, self.markov.entropy),
            ("compression", self.compression.done, self.compression.entropy),
            ("t_tuple", self.suffix_group.t_tuple_done, self.suffix_group.t_tuple_entropy),
            ("lrs", self.suffix_group.lrs_done, self.suffix_group.lrs_entropy),
            ("multi_mcw", self.multi_mcw.done, self.multi_mcw.entropy),
            ("lag", self.lag.done, self.lag.entropy),
            ("multi_mmc", self.multi_mmc.done, self.multi_mmc.entropy),
            ("lz78y", self.lz78y.done, self.lz78y.entropy),
        ]
    }

    /// The min-of-minima rule: the smallest entropy among
    /// estimators that actually produced a result this block, clipped to
    /// `[0, log2(k)]`. `None` if no estimator was `done`.
    pub fn min_entropy(&self, bit_width: f64) -> Option<f64> {
        self.entropies()
            .into_iter()
            .filter(|&(_, done, _)| done)
            .map(|(_, _, e)| e.clamp(0.0, bit_width))
            .fold(None, |acc, e| Some(acc.map_or(e, |a: f64| a.min(e))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_full_battery_on_constant_stream() {
        let symbols = vec![0u8; 5000];
        let r = run_battery(&symbols, 2).unwrap();
        assert_eq!(r.min_entropy(1.0), Some(0.0));
    }

    #[test]
    fn min_entropy_is_the_smallest_done_estimator() {
        let symbols: Vec<u8> = (0..5000u32).map(|i| ((i * 2654435761) % 4) as u8).collect();
        let r = run_battery(&symbols, 4).unwrap();
        let bit_width = 4f64.log2();
        let min = r.min_entropy(bit_width).unwrap();
        for &(_, done, entropy) in &r.entropies() {
            if done {
                assert!(min <= entropy + 1e-9);
            }
        }
    }
}
