/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Symbol translation: order-preserving relabelling of raw samples
//! into a dense alphabet `{0,...,k-1}`, plus the translated median.

use std::collections::BTreeMap;

use crate::consts::STATDATA_MAX;
use crate::errors::{err_exit_code, ExitCode};
use anyhow::Result;

/// Result of translating a raw sample stream.
pub struct Translated {
    pub symbols: Vec<u8>,
    pub k: u16,
    pub median: f64,
    /// whether relabelling actually changed any value (caller telemetry)
    pub translation_occurred: bool,
}

/// Translates `raw` (arbitrary nonnegative integers, unknown upper
/// bound) into a dense alphabet, choosing between histogram and
/// sort-based relabelling per SP 800-90B's cost-crossover rule.
pub fn translate(raw: &[u64]) -> Result<Translated> {
    let l = raw.len();
    if l == 0 {
        return err_exit_code(ExitCode::Unsupported, "translate: empty input");
    }

    if l == 1 {
        return Ok(Translated {
            symbols: vec![0],
            k: 1,
            median: 0.0,
            translation_occurred: raw[0] != 0,
        });
    }

    // distinct-value estimate informs the strategy-selection cost model;
    // a full distinct count is cheap relative to the rest of translate
    // since it's one pass with a BTreeMap (bounded in practice by k).
    let max_val = *raw.iter().max().unwrap();

    let use_histogram = should_use_histogram(l, max_val);

    let (symbols, k) = if use_histogram {
        histogram_relabel(raw)?
    } else {
        sort_relabel(raw)?
    };

    if k as usize > STATDATA_MAX {
        return err_exit_code(
            ExitCode::Unsupported,
            "translate: alphabet exceeds 256 distinct symbols",
        );
    }

    let median = median_of(&symbols);
    let translation_occurred = symbols
        .iter()
        .zip(raw.iter())
        .any(|(&s, &r)| s as u64 != r);

    Ok(Translated {
        symbols,
        k,
        median,
        translation_occurred,
    })
}

/// `2(L+k) < L*(1.39*log2(L) + log2(min(k,L)))` and `log2(k) < 28`,
/// using an upper bound on k (`max_val + 1`) since the true distinct
/// count isn't known without doing the histogram pass itself.
fn should_use_histogram(l: usize, max_val: u64) -> bool {
    let k_upper = (max_val + 1) as f64;
    if k_upper.log2() >= 28.0 {
        return false;
    }
    if k_upper as usize > STATDATA_MAX * 4096 {
        // histogram of this size would itself be wasteful; let sort handle it
        return false;
    }

    let l_f = l as f64;
    let lhs = 2.0 * (l_f + k_upper);
    let rhs = l_f * (1.39 * l_f.log2() + k_upper.min(l_f).log2().max(0.0));
    lhs < rhs
}

fn histogram_relabel(raw: &[u64]) -> Result<(Vec<u8>, u16)> {
    let max_val = *raw.iter().max().unwrap();
    let hist_len = (max_val + 1) as usize;

    let mut present = vec![false; hist_len];
    for &v in raw {
        present[v as usize] = true;
    }

    let mut label_of = vec![0u16; hist_len];
    let mut next_label: u16 = 0;
    for (v, &p) in present.iter().enumerate() {
        if p {
            label_of[v] = next_label;
            next_label += 1;
        }
    }

    let symbols: Vec<u8> = raw.iter().map(|&v| label_of[v as usize] as u8).collect();

    Ok((symbols, next_label))
}

fn sort_relabel(raw: &[u64]) -> Result<(Vec<u8>, u16)> {
    // BTreeMap keeps only the distinct values actually observed, which
    // bounds memory when the raw alphabet is sparse but wide.
    let mut rank: BTreeMap<u64, u16> = BTreeMap::new();
    for &v in raw {
        rank.entry(v).or_insert(0);
    }
    for (label, (_, slot)) in rank.iter_mut().enumerate() {
        *slot = label as u16;
    }

    let symbols: Vec<u8> = raw.iter().map(|&v| rank[&v] as u8).collect();
    let k = rank.len() as u16;

    Ok((symbols, k))
}

fn median_of(symbols: &[u8]) -> f64 {
    let mut sorted: Vec<u8> = symbols.to_vec();
    sorted.sort_unstable();

    let l = sorted.len();
    let lo = (l - 1) / 2;
    let hi = l / 2;

    if lo == hi {
        sorted[lo] as f64
    } else {
        (sorted[lo] as f64 + sorted[hi] as f64) / 2.0
    }
}

/// Re-applies `translate` to an already-translated stream; used to check
/// idempotence (`translate(translate(S)) == translate(S)`).
pub fn translate_u8(symbols: &[u8]) -> Result<Translated> {
    let raw: Vec<u64> = symbols.iter().map(|&s| s as u64).collect();
    translate(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_input_collapses_to_k_one() {
        let raw = vec![0u64; 1000];
        let t = translate(&raw).unwrap();
        assert_eq!(t.k, 1);
        assert!(t.symbols.iter().all(|&s| s == 0));
    }

    #[test]
    fn preserves_order_of_labels() {
        let raw = vec![10u64, 20, 10, 30, 20, 10];
        let t = translate(&raw).unwrap();
        assert_eq!(t.k, 3);
        // original order 10 < 20 < 30 must map to 0 < 1 < 2
        assert_eq!(t.symbols, vec![0, 1, 0, 2, 1, 0]);
    }

    #[test]
    fn is_idempotent() {
        let raw = vec![5u64, 1, 1, 9, 5, 3];
        let first = translate(&raw).unwrap();
        let second = translate_u8(&first.symbols).unwrap();
        assert_eq!(first.symbols, second.symbols);
        assert_eq!(first.k, second.k);
    }

    #[test]
    fn median_of_even_length_is_midpoint() {
        let raw = vec![0u64, 1, 2, 3];
        let t = translate(&raw).unwrap();
        // symbols are 0,1,2,3 -> sorted median of positions 1,2 -> (1+2)/2
        assert!((t.median - 1.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_alphabet_too_wide() {
        let raw: Vec<u64> = (0..300u64).collect();
        let err = translate(&raw).unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }
}
