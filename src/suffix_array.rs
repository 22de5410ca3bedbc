/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Suffix array + LCP. Builds SA via prefix doubling (rank-pair
//! radix refinement implemented with a comparator sort here, since
//! correctness - not raw throughput - is what the estimator battery
//! depends on) then the Kasai LCP pass.
//!
//! The t-Tuple/LRS estimators never see raw symbols directly; they
//! only see `SuffixArrayLcp`, kept in-crate rather than pulled from a
//! third-party suffix-sort library so the whole battery builds without
//! an unverified external dependency.

use std::cmp::Ordering;

/// A suffix array over a virtual-terminator-prefixed alphabet: `sa` has
/// length `n + 1` with `sa[0] == n` (the terminator, lexicographically
/// smaller than every real symbol). `lcp[0]` is `None` (no predecessor);
/// `lcp[1] == Some(0)` since the terminator shares no prefix with any
/// real suffix; `lcp[i]` for `i >= 2` is the LCP of the suffixes at
/// `sa[i-1]` and `sa[i]`.
pub struct SuffixArrayLcp {
    pub sa: Vec<usize>,
    pub lcp: Vec<Option<usize>>,
    n: usize,
}

impl SuffixArrayLcp {
    pub fn build(s: &[u8]) -> Self {
        let n = s.len();

        if n == 0 {
            return SuffixArrayLcp {
                sa: vec![0],
                lcp: vec![None],
                n: 0,
            };
        }

        let real_sa = prefix_doubling_suffix_array(s);
        let real_lcp = kasai_lcp(s, &real_sa);

        let mut sa = Vec::with_capacity(n + 1);
        sa.push(n);
        sa.extend_from_slice(&real_sa);

        let mut lcp = Vec::with_capacity(n + 1);
        lcp.push(None);
        lcp.push(Some(0));
        lcp.extend(real_lcp[1..].iter().map(|&v| Some(v)));

        SuffixArrayLcp { sa, lcp, n }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// Prefix-doubling suffix array construction over `s` (not including the
/// virtual terminator). `O(n log^2 n)`: each of the `O(log n)` rounds
/// refines ranks by sorting rank pairs.
fn prefix_doubling_suffix_array(s: &[u8]) -> Vec<usize> {
    let n = s.len();
    let mut sa: Vec<usize> = (0..n).collect();
    let mut rank: Vec<i64> = s.iter().map(|&b| b as i64).collect();
    let mut tmp = vec![0i64; n];

    let mut k = 1usize;
    while k < n {
        let rank_at = |i: usize| -> i64 {
            if i + k < n {
                rank[i + k]
            } else {
                -1
            }
        };

        let cmp = |&a: &usize, &b: &usize| -> Ordering {
            rank[a].cmp(&rank[b]).then_with(|| rank_at(a).cmp(&rank_at(b)))
        };

        sa.sort_unstable_by(cmp);

        tmp[sa[0]] = 0;
        for i in 1..n {
            let increase = cmp(&sa[i - 1], &sa[i]) == Ordering::Less;
            tmp[sa[i]] = tmp[sa[i - 1]] + if increase { 1 } else { 0 };
        }
        rank.copy_from_slice(&tmp);

        if rank[sa[n - 1]] as usize == n - 1 {
            break;
        }
        k *= 2;
    }

    sa
}

/// Kasai's O(n) LCP construction. `lcp[0]` is unused (no predecessor
/// suffix); `lcp[i]` for `i >= 1` is the LCP of `sa[i-1]` and `sa[i]`.
fn kasai_lcp(s: &[u8], sa: &[usize]) -> Vec<usize> {
    let n = s.len();
    let mut rank_of = vec![0usize; n];
    for (i, &suffix) in sa.iter().enumerate() {
        rank_of[suffix] = i;
    }

    let mut lcp = vec![0usize; n];
    let mut h = 0usize;

    for i in 0..n {
        let r = rank_of[i];
        if r > 0 {
            let j = sa[r - 1];
            while i + h < n && j + h < n && s[i + h] == s[j + h] {
                h += 1;
            }
            lcp[r] = h;
            if h > 0 {
                h -= 1;
            }
        } else {
            h = 0;
        }
    }

    lcp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffixes(s: &[u8], idx: usize) -> &[u8] {
        &s[idx..]
    }

    #[test]
    fn suffix_array_is_permutation_and_sorted() {
        let s = b"banana".to_vec();
        let sal = SuffixArrayLcp::build(&s);

        assert_eq!(sal.sa.len(), s.len() + 1);
        assert_eq!(sal.sa[0], s.len());

        let mut sorted = sal.sa.clone();
        sorted.sort_unstable();
        let expected: Vec<usize> = (0..=s.len()).collect();
        assert_eq!(sorted, expected);

        for w in sal.sa[1..].windows(2) {
            assert!(suffixes(&s, w[0]) < suffixes(&s, w[1]));
        }
    }

    #[test]
    fn lcp_matches_naive_computation() {
        let s = b"abababab".to_vec();
        let sal = SuffixArrayLcp::build(&s);

        assert_eq!(sal.lcp[0], None);
        assert_eq!(sal.lcp[1], Some(0));

        for i in 2..sal.sa.len() {
            let a = sal.sa[i - 1];
            let b = sal.sa[i];
            let sa_suffix = suffixes(&s, a);
            let sb_suffix = suffixes(&s, b);
            let naive = sa_suffix
                .iter()
                .zip(sb_suffix.iter())
                .take_while(|(x, y)| x == y)
                .count();
            assert_eq!(sal.lcp[i], Some(naive));
        }
    }

    #[test]
    fn single_symbol_block() {
        let s = vec![0u8; 16];
        let sal = SuffixArrayLcp::build(&s);
        assert_eq!(sal.sa.len(), 17);

        // suffixes of an all-zero string sort by increasing length, so
        // the real suffix array (after the terminator) is 15,14,...,0
        let expected_real: Vec<usize> = (0..16).rev().collect();
        assert_eq!(&sal.sa[1..], expected_real.as_slice());

        // the longest two suffixes (lengths 16 and 15) share a 15-long prefix
        assert_eq!(sal.lcp[sal.lcp.len() - 1], Some(15));
    }
}
