/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Compression (Maurer universal statistic) estimator (SP 800-90B
//! section 6.3.4), operating over overlapping b-symbol words rather
//! than the raw alphabet directly.

use std::collections::HashMap;

use crate::consts::{COMPRESSION_B, COMPRESSION_D, Z_995};
use crate::errors::{err_exit_code, ExitCode};
use crate::numeric::{mean_stddev, monotonic_search};
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
pub struct CompressionResult {
    pub done: bool,
    pub mean: f64,
    pub std_dev: f64,
    pub block_size: usize,
    pub p: f64,
    pub entropy: f64,
    pub mean_bound: f64,
}

pub fn estimate(symbols: &[u8], k: u16) -> Result<CompressionResult> {
    let b = COMPRESSION_B;
    let d = COMPRESSION_D;

    if k <= 1 {
        return Ok(CompressionResult {
            done: true,
            mean: 0.0,
            std_dev: 0.0,
            block_size: b,
            p: 1.0,
            entropy: 0.0,
            mean_bound: 0.0,
        });
    }

    let l = symbols.len();
    if l < b + d + 2 {
        return err_exit_code(ExitCode::Unsupported, "compression: block too short for b,d parameters");
    }

    let num_words = l - b + 1;
    let words = word_keys(symbols, b);

    let mut last_seen: HashMap<u64, usize> = HashMap::new();
    for (j, &key) in words.iter().enumerate().take(d) {
        last_seen.insert(key, j);
    }

    let mut log2_distances = Vec::with_capacity(num_words - d);
    for j in d..num_words {
        let key = words[j];
        let dist = match last_seen.get(&key) {
            Some(&prev) => (j - prev).min(d),
            None => d,
        };
        log2_distances.push((dist as f64).log2());
        last_seen.insert(key, j);
    }

    let (mean, std_dev) = mean_stddev(&log2_distances);
    let v = log2_distances.len() as f64;
    let b_f = b as f64;
    let c = 0.7 - 0.8 / b_f + (4.0 + 32.0 / b_f) * v.powf(-3.0 / b_f) / 15.0;

    let mean_bound = (mean - Z_995 * std_dev * c / v.sqrt()).max(0.0);

    let k_tuple = (k as f64).powf(b_f);
    let p = monotonic_search(1.0 / k_tuple, 1.0, |p| word_mean(p, k_tuple, d) <= mean_bound)?;

    let bit_width = (k as f64).log2();
    let entropy = (-p.log2() / b_f).clamp(0.0, bit_width);

    Ok(CompressionResult {
        done: true,
        mean,
        std_dev,
        block_size: b,
        p,
        entropy,
        mean_bound,
    })
}

fn word_keys(symbols: &[u8], b: usize) -> Vec<u64> {
    let mut keys = Vec::with_capacity(symbols.len() - b + 1);
    for window in symbols.windows(b) {
        let mut key = 0u64;
        for &s in window {
            key = (key << 8) | s as u64;
        }
        keys.push(key);
    }
    keys
}

/// Expected `log2(D)` under the cap-at-`d_max` convention, for a word
/// recurring with per-trial probability `p` (`D` is geometric, with the
/// tail beyond `d_max` pinned at `d_max` rather than dropped).
fn expected_log2_geometric(p: f64, d_max: usize) -> f64 {
    let mut total = 0.0;
    let mut survival = 1.0; // Pr(no success in the first d-1 trials)

    for d in 1..d_max {
        let mass = survival * p;
        total += (d as f64).log2() * mass;
        survival *= 1.0 - p;
    }
    total += (d_max as f64).log2() * survival;

    total
}

/// Mean `log2(D)` under the two-type model: the word actually observed
/// is the dominant one (probability `p`) with probability `p`, or one of
/// the `k_tuple - 1` uniform others (probability `q` each) otherwise.
fn word_mean(p: f64, k_tuple: f64, d_max: usize) -> f64 {
    let q = (1.0 - p) / (k_tuple - 1.0).max(1.0);
    p * expected_log2_geometric(p, d_max) + (1.0 - p) * expected_log2_geometric(q, d_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_mean_decreases_with_p() {
        let high = word_mean(0.9, 64.0, 1000);
        let low = word_mean(0.1, 64.0, 1000);
        assert!(high < low);
    }

    #[test]
    fn uniform_binary_stream_gives_plausible_entropy() {
        let symbols: Vec<u8> = (0..200_000u32).map(|i| ((i.wrapping_mul(2654435761)) % 2) as u8).collect();
        let r = estimate(&symbols, 2).unwrap();
        assert!(r.entropy >= 0.0 && r.entropy <= 1.0);
    }

    #[test]
    fn constant_stream_gives_zero_entropy() {
        let symbols = vec![0u8; 10_000];
        let r = estimate(&symbols, 2).unwrap();
        assert!(r.entropy < 1e-6, "{}", r.entropy);
    }
}
