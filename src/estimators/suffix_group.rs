/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! t-Tuple and LRS estimators (SP 800-90B sections 6.3.5/6.3.6), both
//! read off the same suffix-array/LCP backbone so they are built
//! together here rather than duplicating the SA/LCP pass per estimator.

use crate::consts::{T_TUPLE_MIN_OCCURRENCES, Z_995};
use crate::errors::{err_exit_code, ExitCode};
use crate::suffix_array::SuffixArrayLcp;
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
pub struct SuffixGroupResult {
    pub t_tuple_done: bool,
    pub t_tuple_p_max: f64,
    pub t_tuple_entropy: f64,
    pub lrs_done: bool,
    pub lrs_p_max: f64,
    pub lrs_entropy: f64,
}

pub fn estimate(symbols: &[u8], k: u16) -> Result<SuffixGroupResult> {
    let l = symbols.len();
    if l < 2 {
        return err_exit_code(ExitCode::Unsupported, "suffix group: need at least two samples");
    }

    let sal = SuffixArrayLcp::build(symbols);
    let bit_width = (k as f64).log2();

    // longest-common-prefix values among real (non-terminator) suffix
    // pairs; index 0 of `sal.lcp` is the sentinel, index 1 always
    // compares against the virtual terminator and is therefore always 0
    let lcps: Vec<usize> = sal.lcp.iter().skip(1).map(|v| v.unwrap_or(0)).collect();

    let w = lcps.iter().copied().max().unwrap_or(0);

    let (t, count_t) = largest_threshold_with_min_occurrences(&lcps, w, T_TUPLE_MIN_OCCURRENCES as usize);

    let t_tuple_done = t > 0;
    let (t_tuple_p_max, t_tuple_entropy) = if t_tuple_done {
        bounded_entropy_from_count(count_t, 1, l, bit_width)
    } else {
        (1.0, 0.0)
    };

    let lrs_done = t_tuple_done && w > t;
    let (lrs_p_max, lrs_entropy) = if lrs_done {
        lrs_bound(&lcps, t, w, l, bit_width)
    } else {
        (1.0, 0.0)
    };

    Ok(SuffixGroupResult {
        t_tuple_done,
        t_tuple_p_max,
        t_tuple_entropy,
        lrs_done,
        lrs_p_max,
        lrs_entropy,
    })
}

/// Number of suffixes sharing a common prefix of length `>= threshold`,
/// maximized over all runs of consecutive LCP values `>= threshold`. A
/// run of `m` consecutive qualifying LCP entries covers `m + 1` suffixes.
fn max_run_count(lcps: &[usize], threshold: usize) -> usize {
    let mut max_count = 1usize;
    let mut run = 1usize;

    for &l in lcps {
        if l >= threshold {
            run += 1;
            max_count = max_count.max(run);
        } else {
            run = 1;
        }
    }

    max_count
}

/// Largest `t` in `[1, w]` for which `max_run_count(lcps, t) >=
/// min_occurrences`, found by binary search since `max_run_count` is
/// non-increasing in its threshold. Returns `(0, 0)` if no such `t`
/// exists even at `t = 1`.
fn largest_threshold_with_min_occurrences(lcps: &[usize], w: usize, min_occurrences: usize) -> (usize, usize) {
    if w == 0 {
        return (0, 0);
    }

    let count_at_1 = max_run_count(lcps, 1);
    if count_at_1 < min_occurrences {
        return (0, 0);
    }

    let mut lo = 1usize;
    let mut hi = w;
    // invariant: max_run_count(lcps, lo) >= min_occurrences
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if max_run_count(lcps, mid) >= min_occurrences {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    (lo, max_run_count(lcps, lo))
}

/// MCV-style confidence bound over a count of occurrences of a
/// `tuple_len`-symbol-long tuple, per SP 800-90B section 6.3.5.
fn bounded_entropy_from_count(count: usize, tuple_len: usize, l: usize, bit_width: f64) -> (f64, f64) {
    let windows = (l - tuple_len + 1).max(1) as f64;
    let p_hat = (count as f64 / windows).min(1.0);
    let variance_term = if l > 1 {
        (p_hat * (1.0 - p_hat) / (l - 1) as f64).max(0.0)
    } else {
        0.0
    };
    let p_u = (p_hat + Z_995 * variance_term.sqrt()).min(1.0);
    let entropy = (-p_u.log2()).clamp(0.0, bit_width);
    (p_u, entropy)
}

/// LRS bound (SP 800-90B section 6.3.6): for each candidate tuple length
/// `u` in `(t, w]`, the per-symbol probability implied by the most
/// frequent length-`u` repeat is `(count_u / (L - u + 1))^(1/u)` (the
/// u-th root normalizes a `u`-symbol joint probability back to a
/// per-symbol rate); the estimate is the most conservative (largest)
/// such rate over the range, confidence-bounded the same way as t-Tuple.
fn lrs_bound(lcps: &[usize], t: usize, w: usize, l: usize, bit_width: f64) -> (f64, f64) {
    let mut p_max: f64 = 0.0;

    for u in (t + 1)..=w {
        let count_u = max_run_count(lcps, u);
        if count_u < 2 {
            continue;
        }
        let windows = (l - u + 1).max(1) as f64;
        let p_hat = (count_u as f64 / windows).clamp(0.0, 1.0).powf(1.0 / u as f64);
        p_max = p_max.max(p_hat);
    }

    if p_max <= 0.0 {
        return (1.0, 0.0);
    }

    let variance_term = if l > 1 {
        (p_max * (1.0 - p_max) / (l - 1) as f64).max(0.0)
    } else {
        0.0
    };
    let p_u = (p_max + Z_995 * variance_term.sqrt()).min(1.0);
    let entropy = (-p_u.log2()).clamp(0.0, bit_width);
    (p_u, entropy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highly_repetitive_stream_gives_low_entropy() {
        let symbols: Vec<u8> = (0..4000u32).map(|i| (i % 4) as u8).collect();
        let r = estimate(&symbols, 4).unwrap();
        assert!(r.t_tuple_done);
        assert!(r.t_tuple_entropy < 2.0, "{}", r.t_tuple_entropy);
    }

    #[test]
    fn too_short_for_threshold_marks_not_done() {
        // fewer than 35 samples can never produce 35 repeats of anything
        let symbols: Vec<u8> = (0..20u32).map(|i| (i % 7) as u8).collect();
        let r = estimate(&symbols, 7).unwrap();
        assert!(!r.t_tuple_done);
        assert!(!r.lrs_done);
    }

    #[test]
    fn max_run_count_finds_longest_qualifying_run() {
        let lcps = vec![0, 3, 3, 3, 0, 5, 5];
        assert_eq!(max_run_count(&lcps, 3), 4);
        assert_eq!(max_run_count(&lcps, 5), 3);
        assert_eq!(max_run_count(&lcps, 6), 1);
    }

    #[test]
    fn entropy_is_bounded_by_alphabet_width() {
        let symbols: Vec<u8> = (0..5000u32).map(|i| ((i * 2654435761) % 3) as u8).collect();
        let r = estimate(&symbols, 3).unwrap();
        let bit_width = 3f64.log2();
        assert!(r.t_tuple_entropy <= bit_width + 1e-9);
        assert!(r.lrs_entropy <= bit_width + 1e-9);
    }
}
