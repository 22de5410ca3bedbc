/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Runtime health tests: the Repetition Count Test, the Adaptive
//! Proportion Test, and a cross-bit variant of RCT applied to XORed bit
//! pairs. All three are state machines consumed one sample at a time so
//! a caller can run them online, alongside the batch estimator battery,
//! without re-buffering the stream.
//!
//! Health-test outcomes are never errors - every test here reports a
//! plain `bool`/count, propagated up to the caller as an ordinary
//! value.

/// Repetition Count Test (SP 800-90B section 4.4.1). Fails (and keeps
/// failing) once the current run of a single repeated symbol reaches
/// `cutoff`.
pub struct Rct {
    cutoff: u64,
    current_symbol: Option<u8>,
    run_length: u64,
    failures: u64,
    /// `histogram[i]` = number of completed runs of length `i + 1`,
    /// kept for `derive_cutoff` and caller telemetry.
    histogram: Vec<u64>,
}

impl Rct {
    pub fn new(cutoff: u64) -> Self {
        Rct {
            cutoff,
            current_symbol: None,
            run_length: 0,
            failures: 0,
            histogram: Vec::new(),
        }
    }

    fn record_run_end(&mut self) {
        if self.run_length == 0 {
            return;
        }
        let idx = (self.run_length - 1) as usize;
        if idx >= self.histogram.len() {
            self.histogram.resize(idx + 1, 0);
        }
        self.histogram[idx] += 1;
    }

    /// Feeds one sample, returning `true` iff this sample triggered a
    /// (possibly repeated) cutoff failure.
    pub fn update(&mut self, symbol: u8) -> bool {
        match self.current_symbol {
            Some(a) if a == symbol => {
                self.run_length += 1;
            }
            _ => {
                self.record_run_end();
                self.current_symbol = Some(symbol);
                self.run_length = 1;
            }
        }

        if self.run_length >= self.cutoff {
            self.failures += 1;
            true
        } else {
            false
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    pub fn run_length_histogram(&self) -> &[u64] {
        &self.histogram
    }
}

/// Adaptive Proportion Test (SP 800-90B section 4.4.2). Every `window`
/// samples, the reference symbol resets to whatever comes first in the
/// new window; the test fails if that reference recurs `>= cutoff` times
/// within the window.
pub struct Apt {
    cutoff: u64,
    window: u64,
    reference_symbol: Option<u8>,
    count_in_window: u64,
    position_in_window: u64,
    failures: u64,
    window_count: u64,
    /// `histogram[i]` = number of completed windows where the reference
    /// symbol recurred exactly `i` times.
    histogram: Vec<u64>,
}

impl Apt {
    pub fn new(cutoff: u64, window: u64) -> Self {
        assert!(window > 0, "APT window must be nonzero");
        Apt {
            cutoff,
            window,
            reference_symbol: None,
            count_in_window: 0,
            position_in_window: 0,
            failures: 0,
            window_count: 0,
            histogram: Vec::new(),
        }
    }

    fn record_window_end(&mut self) {
        let idx = self.count_in_window as usize;
        if idx >= self.histogram.len() {
            self.histogram.resize(idx + 1, 0);
        }
        self.histogram[idx] += 1;
        self.window_count += 1;
    }

    /// Feeds one sample, returning `true` iff the just-completed window
    /// (if any) failed.
    pub fn update(&mut self, symbol: u8) -> bool {
        if self.position_in_window == 0 {
            self.reference_symbol = Some(symbol);
            self.count_in_window = 1;
            self.position_in_window = 1;
            return false;
        }

        if self.reference_symbol == Some(symbol) {
            self.count_in_window += 1;
        }
        self.position_in_window += 1;

        if self.position_in_window < self.window {
            return false;
        }

        // window complete
        self.position_in_window = 0;
        let failed = self.count_in_window >= self.cutoff;
        if failed {
            self.failures += 1;
        }
        self.record_window_end();
        failed
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    pub fn window_count_histogram(&self) -> &[u64] {
        &self.histogram
    }
}

/// Lower-triangular `(i, j) -> i(i+1)/2 + j` index for `i >= j`, used by
/// `CrossRct` to pack `n(n+1)/2` pairwise states (including the `n`
/// literal, `i == j`, RCTs) into a flat `Vec`.
fn triangular_index(i: usize, j: usize) -> usize {
    debug_assert!(j <= i);
    i * (i + 1) / 2 + j
}

/// Cross-bit Repetition Count Test (the "entrainment detector"
/// variant): for an `n`-bit symbol, maintains one RCT per bit pair's
/// XOR (including each bit against itself, which is the literal RCT on
/// that bit) and advances them independently each sample.
pub struct CrossRct {
    bits: usize,
    states: Vec<Rct>,
}

impl CrossRct {
    pub fn new(bits: usize, literal_cutoff: u64, cross_cutoff: u64) -> Self {
        let count = bits * (bits + 1) / 2;
        let mut states = Vec::with_capacity(count);
        for i in 0..bits {
            for j in 0..=i {
                let cutoff = if i == j { literal_cutoff } else { cross_cutoff };
                states.push(Rct::new(cutoff));
            }
        }
        CrossRct { bits, states }
    }

    /// Feeds one `bits`-wide symbol: precomputes all pairwise XORs, then
    /// advances each sub-RCT independently. Returns `true` iff any
    /// sub-RCT failed on this sample.
    pub fn update(&mut self, symbol: u32) -> bool {
        let bit_values: Vec<u32> = (0..self.bits).map(|b| (symbol >> b) & 1).collect();

        let mut any_failed = false;
        for i in 0..self.bits {
            for j in 0..=i {
                let xor_bit = (bit_values[i] ^ bit_values[j]) as u8;
                if self.states[triangular_index(i, j)].update(xor_bit) {
                    any_failed = true;
                }
            }
        }
        any_failed
    }

    pub fn failures_at(&self, i: usize, j: usize) -> u64 {
        let (i, j) = if j <= i { (i, j) } else { (j, i) };
        self.states[triangular_index(i, j)].failures()
    }

    pub fn run_length_at(&self, i: usize, j: usize) -> &[u64] {
        let (i, j) = if j <= i { (i, j) } else { (j, i) };
        self.states[triangular_index(i, j)].run_length_histogram()
    }

    pub fn passed(&self) -> bool {
        self.states.iter().all(Rct::passed)
    }
}

/// Derives the smallest run/window count that would yield `<= allowed`
/// failures over an observed run-length (or window-count) histogram,
/// scanning from the largest bucket downward and accumulating. `alpha`
/// is the target per-window false-positive rate; `total_samples` is the
/// number of trials the histogram was built over.
pub fn derive_cutoff(histogram: &[u64], total_samples: u64, alpha: f64) -> u64 {
    let allowed = (total_samples as f64 * alpha).floor() as u64;

    let mut accumulated = 0u64;
    for (len, &count) in histogram.iter().enumerate().rev() {
        accumulated += count;
        if accumulated > allowed {
            return (len + 2) as u64;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rct_fails_on_long_repeat() {
        let mut rct = Rct::new(5);
        let mut failed = false;
        for _ in 0..10 {
            failed |= rct.update(7);
        }
        assert!(failed);
        assert!(!rct.passed());
    }

    #[test]
    fn rct_passes_on_alternating_stream() {
        let mut rct = Rct::new(5);
        for i in 0..1000u32 {
            rct.update((i % 2) as u8);
        }
        assert!(rct.passed());
    }

    #[test]
    fn apt_fails_when_reference_dominates_window() {
        let mut apt = Apt::new(8, 10);
        let mut failed = false;
        for _ in 0..5 {
            for _ in 0..10 {
                failed |= apt.update(3);
            }
        }
        assert!(failed);
    }

    #[test]
    fn apt_passes_on_uniform_window() {
        let mut apt = Apt::new(9, 10);
        let mut failed = false;
        for _ in 0..100 {
            for i in 0..10u32 {
                failed |= apt.update((i % 4) as u8);
            }
        }
        assert!(!failed);
    }

    #[test]
    fn cross_rct_detects_entrained_bit_pair() {
        // bits 3 and 5 always XOR to 0
        let mut cross = CrossRct::new(8, 100, 100);
        const OTHER_BITS_MASK: u32 = 0xFF & !((1 << 3) | (1 << 5));
        for i in 0u32..10_000 {
            let bit3 = (i >> 1) & 1;
            let symbol = (bit3 << 3) | (bit3 << 5) | (i & OTHER_BITS_MASK);
            cross.update(symbol);
        }
        assert_eq!(cross.failures_at(5, 3), 9_901);
    }

    #[test]
    fn triangular_index_is_injective_over_range() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..8usize {
            for j in 0..=i {
                assert!(seen.insert(triangular_index(i, j)));
            }
        }
    }

    #[test]
    fn derive_cutoff_is_monotone_in_alpha() {
        let histogram = vec![100, 50, 20, 5, 1];
        let loose = derive_cutoff(&histogram, 1000, 0.1);
        let tight = derive_cutoff(&histogram, 1000, 0.001);
        assert!(tight <= loose);
    }
}
