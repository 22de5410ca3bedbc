/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Most-Common-Value estimator (SP 800-90B section 6.3.1).

use crate::consts::Z_995;
use crate::errors::{err_exit_code, ExitCode};
use anyhow::Result;

#[derive(Debug, Clone, Copy)]
pub struct McvResult {
    pub done: bool,
    pub entropy: f64,
    pub p_hat: f64,
    pub p_u: f64,
}

pub fn estimate(symbols: &[u8], k: u16) -> Result<McvResult> {
    let l = symbols.len();
    if l == 0 {
        return err_exit_code(ExitCode::Unsupported, "mcv: empty block");
    }

    let mut counts = vec![0u64; k as usize];
    for &s in symbols {
        counts[s as usize] += 1;
    }
    let max_count = *counts.iter().max().unwrap_or(&0);

    let p_hat = max_count as f64 / l as f64;
    let variance_term = if l > 1 {
        (p_hat * (1.0 - p_hat) / (l - 1) as f64).max(0.0)
    } else {
        0.0
    };
    let p_u = (p_hat + Z_995 * variance_term.sqrt()).min(1.0);

    let entropy = (-p_u.log2()).clamp(0.0, (k as f64).log2());

    Ok(McvResult {
        done: true,
        entropy,
        p_hat,
        p_u,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_symbols_give_high_entropy() {
        let symbols: Vec<u8> = (0..4000u32).map(|i| (i % 4) as u8).collect();
        let r = estimate(&symbols, 4).unwrap();
        assert!(r.entropy > 1.9, "{}", r.entropy);
    }

    #[test]
    fn constant_symbol_gives_zero_entropy() {
        let symbols = vec![2u8; 1000];
        let r = estimate(&symbols, 4).unwrap();
        assert!(r.entropy < 0.05, "{}", r.entropy);
    }

    #[test]
    fn rejects_empty_block() {
        assert!(estimate(&[], 4).is_err());
    }
}
