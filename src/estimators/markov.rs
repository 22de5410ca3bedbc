/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Markov estimator (SP 800-90B section 6.3.3), generalized from the
//! binary `T[2][2]` case to a full k-ary transition matrix: k = 2 is
//! just the special case where `initial`/`transitions` happen to have
//! two rows.

use crate::consts::MARKOV_PATH_LEN;
use crate::errors::{err_exit_code, ExitCode};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MarkovResult {
    pub done: bool,
    pub k: u16,
    pub initial: Vec<f64>,
    pub transitions: Vec<Vec<f64>>,
    /// first two entries of `initial`, kept for callers that only care
    /// about the binary-alphabet (k=2) case
    pub p0: f64,
    pub p1: f64,
    pub p_max: f64,
    pub entropy: f64,
}

pub fn estimate(symbols: &[u8], k: u16) -> Result<MarkovResult> {
    let l = symbols.len();
    if l < 2 {
        return err_exit_code(ExitCode::Unsupported, "markov: need at least two samples");
    }
    let k_usize = k as usize;

    if k_usize <= 1 {
        return Ok(MarkovResult {
            done: true,
            k,
            initial: vec![1.0],
            transitions: vec![vec![1.0]],
            p0: 1.0,
            p1: 0.0,
            p_max: 1.0,
            entropy: 0.0,
        });
    }

    let mut symbol_counts = vec![0u64; k_usize];
    for &s in symbols {
        symbol_counts[s as usize] += 1;
    }
    let initial: Vec<f64> = symbol_counts.iter().map(|&c| c as f64 / l as f64).collect();

    let mut pair_counts = vec![vec![0u64; k_usize]; k_usize];
    let mut row_totals = vec![0u64; k_usize];
    for w in symbols.windows(2) {
        let i = w[0] as usize;
        let j = w[1] as usize;
        pair_counts[i][j] += 1;
        row_totals[i] += 1;
    }

    let transitions: Vec<Vec<f64>> = (0..k_usize)
        .map(|i| {
            if row_totals[i] == 0 {
                vec![0.0; k_usize]
            } else {
                pair_counts[i].iter().map(|&c| c as f64 / row_totals[i] as f64).collect()
            }
        })
        .collect();

    let log2_or_neg_inf = |p: f64| if p > 0.0 { p.log2() } else { f64::NEG_INFINITY };

    let log_initial: Vec<f64> = initial.iter().copied().map(log2_or_neg_inf).collect();
    let log_transitions: Vec<Vec<f64>> = transitions
        .iter()
        .map(|row| row.iter().copied().map(log2_or_neg_inf).collect())
        .collect();

    // Viterbi (max-plus) DP over log2 probabilities: dp[j] is the log2
    // probability of the most likely length-`step` path ending at j.
    let mut dp = log_initial.clone();
    for _ in 1..MARKOV_PATH_LEN {
        let mut next = vec![f64::NEG_INFINITY; k_usize];
        for j in 0..k_usize {
            let mut best = f64::NEG_INFINITY;
            for i in 0..k_usize {
                let cand = dp[i] + log_transitions[i][j];
                if cand > best {
                    best = cand;
                }
            }
            next[j] = best;
        }
        dp = next;
    }

    let best_log = dp.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let p_max = if best_log.is_finite() { best_log.exp2() } else { 0.0 };

    let bit_width = (k as f64).log2();
    let entropy = if best_log.is_finite() {
        (-best_log / MARKOV_PATH_LEN as f64).clamp(0.0, bit_width)
    } else {
        bit_width
    };

    Ok(MarkovResult {
        done: true,
        k,
        p0: initial.first().copied().unwrap_or(0.0),
        p1: initial.get(1).copied().unwrap_or(0.0),
        initial,
        transitions,
        p_max,
        entropy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biased_binary_gives_low_entropy() {
        // heavily biased toward 0: long runs of the same symbol are likely
        let symbols: Vec<u8> = (0..100_000u32).map(|i| if i % 10 == 0 { 1 } else { 0 }).collect();
        let r = estimate(&symbols, 2).unwrap();
        assert!(r.entropy < 1.0, "{}", r.entropy);
    }

    #[test]
    fn constant_symbol_gives_zero_entropy() {
        let symbols = vec![0u8; 5000];
        let r = estimate(&symbols, 2).unwrap();
        assert!(r.entropy < 1e-6, "{}", r.entropy);
    }

    #[test]
    fn single_symbol_alphabet_is_trivial() {
        let symbols = vec![0u8; 10];
        let r = estimate(&symbols, 1).unwrap();
        assert_eq!(r.entropy, 0.0);
        assert_eq!(r.p_max, 1.0);
    }
}
