/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Restart sanity test: compares a restart-experiment `r x c`
//! matrix against the worst-case ("inverted near-uniform") distribution
//! consistent with an asserted entropy `H_I`, either via Monte-Carlo
//! simulation or a closed-form binomial bound.
//!
//! The simulation path is the crate's one genuinely parallel inner
//! loop: a `std::thread::scope` worker pool partitions simulation
//! rounds into chunks, each worker carries a
//! private RNG derived from the parent stream so the whole run
//! stays reproducible under `config.deterministic`, and results are
//! merged under a sort at a hard join barrier - there is no inter-thread
//! communication during simulation itself.

use crate::config::EstimatorConfig;
use crate::errors::{err_exit_code, ExitCode};
use crate::numeric::{incomplete_beta, percentile_sorted};
use crate::rng::Rng;
use anyhow::Result;

#[cfg(feature = "use_rayon")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct RestartResult {
    pub x_r: u64,
    pub x_c: u64,
    pub x_max: u64,
    /// Monte-Carlo cutoff (simulation mode) the observed `x_max` was
    /// compared against; `None` in binomial mode.
    pub cutoff: Option<u64>,
    /// p-value (binomial mode only).
    pub p_value: Option<f64>,
    pub passed: bool,
}

/// `r x c` matrix of already-translated symbols (row-major), the shape
/// a restart experiment produces: `c` independent restarts of `r`
/// samples each, or vice versa depending on which axis the caller
/// treats as "restart".
pub struct RestartMatrix<'a> {
    pub rows: usize,
    pub cols: usize,
    pub data: &'a [u8],
}

impl<'a> RestartMatrix<'a> {
    pub fn new(data: &'a [u8], rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return err_exit_code(ExitCode::Unsupported, "restart matrix: data length does not match rows*cols");
        }
        Ok(RestartMatrix { rows, cols, data })
    }

    fn cell(&self, r: usize, c: usize) -> u8 {
        self.data[r * self.cols + c]
    }

    /// Max, over all symbols, of that symbol's count within a single row.
    fn row_max(&self, r: usize, k: u16) -> u64 {
        let mut counts = vec![0u64; k as usize];
        for c in 0..self.cols {
            counts[self.cell(r, c) as usize] += 1;
        }
        counts.into_iter().max().unwrap_or(0)
    }

    fn col_max(&self, c: usize, k: u16) -> u64 {
        let mut counts = vec![0u64; k as usize];
        for r in 0..self.rows {
            counts[self.cell(r, c) as usize] += 1;
        }
        counts.into_iter().max().unwrap_or(0)
    }

    fn x_r(&self, k: u16) -> u64 {
        (0..self.rows).map(|r| self.row_max(r, k)).max().unwrap_or(0)
    }

    fn x_c(&self, k: u16) -> u64 {
        (0..self.cols).map(|c| self.col_max(c, k)).max().unwrap_or(0)
    }
}

/// Runs the restart-sanity test by Monte-Carlo simulation of the
/// inverted-near-uniform worst-case distribution implied by `h_i`.
pub fn restart_sanity_simulated(
    matrix: &RestartMatrix,
    k: u16,
    h_i: f64,
    config: &EstimatorConfig,
    rng: &mut Rng,
) -> Result<RestartResult> {
    if h_i < 0.0 || h_i > (k as f64).log2() {
        return err_exit_code(ExitCode::Unsupported, "restart_sanity: H_I out of [0, log2(k)]");
    }

    let x_r = matrix.x_r(k);
    let x_c = matrix.x_c(k);
    let x_max = x_r.max(x_c);

    let p = 2f64.powf(-h_i);
    let dist = InvertedNearUniform::new(p, k);

    let rounds = config.bootstrap_rounds;
    let samples = simulate_many(&dist, matrix.rows, matrix.cols, rounds, config.thread_count, rng);

    let mut sorted = samples;
    sorted.sort_unstable();
    let quantile = percentile_sorted(&sorted, 1.0 - config.restart_alpha);
    let cutoff = quantile.ceil() as u64;

    Ok(RestartResult {
        x_r,
        x_c,
        x_max,
        cutoff: Some(cutoff),
        p_value: None,
        passed: x_max <= cutoff,
    })
}

/// Binomial-mode fallback (single fixed symbol of asserted probability
/// `p = 2^-h_i`): `p_value = I_p(X_max, n + 1 - X_max)`, the regularized
/// incomplete beta evaluated via Lentz's continued fraction.
pub fn restart_sanity_binomial(matrix: &RestartMatrix, k: u16, h_i: f64, alpha: f64) -> Result<RestartResult> {
    if h_i < 0.0 || h_i > (k as f64).log2() {
        return err_exit_code(ExitCode::Unsupported, "restart_sanity: H_I out of [0, log2(k)]");
    }

    let x_r = matrix.x_r(k);
    let x_c = matrix.x_c(k);
    let x_max = x_r.max(x_c);

    let n = (matrix.rows * matrix.cols) as u64;
    let p = 2f64.powf(-h_i);

    let p_value = if x_max >= n {
        0.0
    } else {
        incomplete_beta(p, x_max as f64, (n + 1 - x_max) as f64)?
    };

    Ok(RestartResult {
        x_r,
        x_c,
        x_max,
        cutoff: None,
        p_value: Some(p_value),
        passed: p_value >= alpha,
    })
}

/// The "worst-case" distribution family consistent with a given
/// per-sample max-probability `p`: `floor(1/p)` maximally-likely symbols
/// of probability `p` each, plus (if `1/p` is not an integer) one
/// residual symbol carrying the remaining mass.
struct InvertedNearUniform {
    cumulative: Vec<f64>,
}

impl InvertedNearUniform {
    fn new(p: f64, k: u16) -> Self {
        let k = k as usize;
        let count_max_prob = ((1.0 / p).floor() as usize).clamp(1, k);
        let residual_mass = (1.0 - count_max_prob as f64 * p).max(0.0);

        let mut cumulative = Vec::with_capacity(k);
        let mut running = 0.0;
        for i in 0..k {
            running += if i < count_max_prob {
                p
            } else if i == count_max_prob && residual_mass > 0.0 {
                residual_mass
            } else {
                0.0
            };
            cumulative.push(running);
        }
        // guard against floating-point drift leaving the top short of 1.0
        if let Some(last) = cumulative.last_mut() {
            *last = last.max(1.0);
        }

        InvertedNearUniform { cumulative }
    }

    fn draw(&self, rng: &mut Rng) -> u8 {
        let u = rng.random_unit();
        match self.cumulative.partition_point(|&c| c <= u) {
            idx if idx < self.cumulative.len() => idx as u8,
            _ => (self.cumulative.len() - 1) as u8,
        }
    }
}

/// Draws `rounds` independent `rows x cols` matrices from `dist` and
/// returns the `X_max` of each, split across `thread_count` worker
/// threads. Each worker gets a private RNG spawned from `rng` up front
/// so the whole simulation is reproducible under a fixed parent seed,
/// and results are merged by simple concatenation (the caller sorts).
#[cfg(not(feature = "use_rayon"))]
fn simulate_many(
    dist: &InvertedNearUniform,
    rows: usize,
    cols: usize,
    rounds: usize,
    thread_count: usize,
    rng: &mut Rng,
) -> Vec<f64> {
    let thread_count = thread_count.max(1).min(rounds.max(1));
    let chunk = (rounds + thread_count - 1) / thread_count.max(1);

    let mut child_rngs: Vec<Rng> = (0..thread_count).map(|_| rng.spawn_child()).collect();

    let mut results = Vec::with_capacity(rounds);
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(thread_count);
        for worker_rng in child_rngs.iter_mut() {
            let this_chunk = chunk.min(rounds);
            handles.push(scope.spawn(move || simulate_chunk(dist, rows, cols, this_chunk, worker_rng)));
        }

        for handle in handles {
            results.extend(handle.join().expect("simulation worker panicked"));
        }
    });

    results.truncate(rounds);
    results
}

/// Work-stealing alternative to the fixed-chunk `std::thread::scope`
/// path above, gated behind the `use_rayon` feature: each chunk still
/// gets its own private RNG (seeded up front from the parent stream, as
/// above) but rayon's scheduler - not a fixed partition - decides which
/// worker runs which chunk.
#[cfg(feature = "use_rayon")]
fn simulate_many(
    dist: &InvertedNearUniform,
    rows: usize,
    cols: usize,
    rounds: usize,
    thread_count: usize,
    rng: &mut Rng,
) -> Vec<f64> {
    let thread_count = thread_count.max(1).min(rounds.max(1));
    let chunk = (rounds + thread_count - 1) / thread_count.max(1);

    let mut child_rngs: Vec<Rng> = (0..thread_count).map(|_| rng.spawn_child()).collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .expect("failed to build rayon thread pool for restart-sanity simulation");

    let results: Vec<Vec<f64>> = pool.install(|| {
        child_rngs
            .par_iter_mut()
            .map(|worker_rng| simulate_chunk(dist, rows, cols, chunk.min(rounds), worker_rng))
            .collect()
    });

    let mut flat: Vec<f64> = results.into_iter().flatten().collect();
    flat.truncate(rounds);
    flat
}

fn simulate_chunk(dist: &InvertedNearUniform, rows: usize, cols: usize, count: usize, rng: &mut Rng) -> Vec<f64> {
    let mut out = Vec::with_capacity(count);
    let k = dist.cumulative.len() as u16;

    for _ in 0..count {
        let mut row_counts = vec![vec![0u64; k as usize]; rows];
        let mut col_counts = vec![vec![0u64; k as usize]; cols];

        for r in 0..rows {
            for c in 0..cols {
                let sym = dist.draw(rng) as usize;
                row_counts[r][sym] += 1;
                col_counts[c][sym] += 1;
            }
        }

        let x_r = row_counts.iter().flat_map(|row| row.iter().copied()).max().unwrap_or(0);
        let x_c = col_counts.iter().flat_map(|col| col.iter().copied()).max().unwrap_or(0);
        out.push(x_r.max(x_c) as f64);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_matrix_passes_simulation() {
        let k = 4u16;
        let rows = 10;
        let cols = 10;
        let data: Vec<u8> = (0..rows * cols).map(|i| (i % k as usize) as u8).collect();
        let matrix = RestartMatrix::new(&data, rows, cols).unwrap();

        let config = EstimatorConfig::builder().deterministic(7).bootstrap_rounds(500).build();
        let mut rng = Rng::from_seed(config.seed);

        let h_i = (k as f64).log2();
        let result = restart_sanity_simulated(&matrix, k, h_i, &config, &mut rng).unwrap();
        assert!(result.passed, "x_max={} cutoff={:?}", result.x_max, result.cutoff);
    }

    #[test]
    fn degenerate_matrix_fails_simulation() {
        let k = 4u16;
        let rows = 10;
        let cols = 10;
        let data = vec![0u8; rows * cols];
        let matrix = RestartMatrix::new(&data, rows, cols).unwrap();

        let config = EstimatorConfig::builder().deterministic(7).bootstrap_rounds(500).build();
        let mut rng = Rng::from_seed(config.seed);

        let h_i = (k as f64).log2();
        let result = restart_sanity_simulated(&matrix, k, h_i, &config, &mut rng).unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn binomial_mode_agrees_with_simulation_direction() {
        let k = 2u16;
        let rows = 20;
        let cols = 20;
        let data = vec![0u8; rows * cols];
        let matrix = RestartMatrix::new(&data, rows, cols).unwrap();

        let result = restart_sanity_binomial(&matrix, k, 1.0, 0.01).unwrap();
        assert!(!result.passed);
        assert!(result.p_value.unwrap() < 0.01);
    }

    #[test]
    fn inverted_near_uniform_cumulative_reaches_one() {
        let dist = InvertedNearUniform::new(0.25, 4);
        assert!((dist.cumulative.last().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_entropy_above_alphabet_width() {
        let data = vec![0u8; 16];
        let matrix = RestartMatrix::new(&data, 4, 4).unwrap();
        let config = EstimatorConfig::new();
        let mut rng = Rng::from_seed(1);
        assert!(restart_sanity_simulated(&matrix, 2, 5.0, &config, &mut rng).is_err());
    }
}
