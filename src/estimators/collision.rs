/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Collision estimator (SP 800-90B section 6.3.2).

use std::collections::HashSet;

use crate::consts::Z_995;
use crate::errors::{err_exit_code, ExitCode};
use crate::numeric::{mean_stddev, monotonic_search};
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
pub struct CollisionResult {
    pub done: bool,
    pub mean: f64,
    pub std_dev: f64,
    pub p: f64,
    pub entropy: f64,
    pub mean_bound: f64,
}

pub fn estimate(symbols: &[u8], k: u16) -> Result<CollisionResult> {
    if k <= 1 {
        return Ok(CollisionResult {
            done: true,
            mean: 2.0,
            std_dev: 0.0,
            p: 1.0,
            entropy: 0.0,
            mean_bound: 2.0,
        });
    }

    let lengths = collision_lengths(symbols);
    if lengths.len() < 2 {
        return err_exit_code(
            ExitCode::Unsupported,
            "collision: fewer than two complete collision runs in block",
        );
    }

    let values: Vec<f64> = lengths.iter().map(|&l| l as f64).collect();
    let (mean, std_dev) = mean_stddev(&values);
    let n = values.len() as f64;

    // domain minimum collision length is 2 (the earliest a repeat can occur)
    let mean_bound = (mean - Z_995 * std_dev / n.sqrt()).max(2.0);

    let p = monotonic_search(1.0 / k as f64, 1.0, |p| collision_mean(p, k) <= mean_bound)?;
    let entropy = (-p.log2()).clamp(0.0, (k as f64).log2());

    Ok(CollisionResult {
        done: true,
        mean,
        std_dev,
        p,
        entropy,
        mean_bound,
    })
}

/// Non-overlapping collision run lengths: the distance (inclusive) from
/// the start of each segment to the first repeated symbol within it.
fn collision_lengths(symbols: &[u8]) -> Vec<u64> {
    let mut seen = HashSet::new();
    let mut lengths = Vec::new();
    let mut len = 0u64;

    for &s in symbols {
        len += 1;
        if !seen.insert(s) {
            lengths.push(len);
            seen.clear();
            len = 0;
        }
    }

    lengths
}

/// Exact expected collision-run length under the conservative two-type
/// model (one symbol of probability `p`, the remaining `k-1` symbols
/// uniform at `q = (1-p)/(k-1)`), via `E[T] = sum_t Pr(T > t)` and the
/// elementary-symmetric-polynomial identity
/// `Pr(all distinct in t draws) = t! * e_t(p_1,...,p_k)`, which for this
/// two-type distribution collapses to a simple recurrence over the
/// falling factorial of `k-1`.
fn collision_mean(p: f64, k: u16) -> f64 {
    let k = k as i64;
    let q = (1.0 - p) / (k - 1) as f64;

    let mut total = 1.0; // Pr(T > 0) = 1
    let mut prev_fa = 1.0; // falling_factorial(k-1, 0) * q^0

    for t in 1..=k {
        let raw_factor = (k - 1 - (t - 1)) as f64;
        let factor = if raw_factor > 0.0 { raw_factor * q } else { 0.0 };
        let fa_t = prev_fa * factor;

        let term2 = t as f64 * prev_fa * p;
        let survival = fa_t + term2;
        total += survival;

        prev_fa = fa_t;
        if survival < 1e-15 && t > 1 {
            break;
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_binary_gives_near_max_entropy() {
        let symbols: Vec<u8> = (0..200_000u32).map(|i| (i % 2) as u8).collect();
        let r = estimate(&symbols, 2).unwrap();
        assert!(r.entropy > 0.9, "{}", r.entropy);
    }

    #[test]
    fn constant_stream_gives_zero_entropy() {
        let symbols = vec![0u8; 10_000];
        let r = estimate(&symbols, 2).unwrap();
        assert!(r.entropy < 1e-6, "{}", r.entropy);
    }

    #[test]
    fn collision_mean_decreases_with_p() {
        let high = collision_mean(0.9, 4);
        let low = collision_mean(0.3, 4);
        assert!(high < low);
    }
}
