/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Dictionary tree: a k-ary trie of adaptive-modulus hash pages,
//! used by the MultiMMC and LZ78Y predictors. Pages use a
//! checksum-tagged, no-probing, enlarge-on-collision hash table: most
//! pages only ever need a handful of entries, but a few need nearly all
//! `k`, so pages start small and grow into direct-mapped tables on
//! demand rather than paying for `k` slots everywhere up front.
//!
//! Pages live in a `Pool<Page>` and are referenced by `u32` index,
//! never by pointer or `Rc` - the tree is acyclic by construction and is
//! torn down by dropping the pool as a unit.

use crate::errors::{err_exit_code, ExitCode};
use crate::pool::Pool;
use anyhow::Result;

#[derive(Clone, Copy)]
struct Slot {
    symbol: Option<u8>,
    count: u32,
    child: Option<u32>,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            symbol: None,
            count: 0,
            child: None,
        }
    }
}

pub struct Page {
    modulus: u16,
    k: u16,
    slots: Vec<Slot>,
    prefix_found: bool,
    max_entry: Option<u8>,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            modulus: 1,
            k: 1,
            slots: vec![Slot::default()],
            prefix_found: false,
            max_entry: None,
        }
    }
}

struct NeedsGrow;

impl Page {
    fn reset(&mut self, k: u16, initial_modulus: u16) {
        self.modulus = initial_modulus;
        self.k = k;
        self.slots = vec![Slot::default(); initial_modulus as usize];
        self.prefix_found = false;
        self.max_entry = None;
    }

    fn slot_for(&self, symbol: u8) -> usize {
        if self.modulus == self.k {
            // fully grown: direct-mapped, one slot per symbol
            symbol as usize
        } else {
            (symbol as usize).wrapping_mul(2_654_435_761) % self.modulus as usize
        }
    }

    fn find_slot(&self, symbol: u8) -> Option<usize> {
        let idx = self.slot_for(symbol);
        if self.slots[idx].symbol == Some(symbol) {
            Some(idx)
        } else {
            None
        }
    }

    /// Returns the slot index for `symbol`, creating an empty entry if
    /// absent. `Err(NeedsGrow)` if the natural slot is occupied by a
    /// different symbol - the caller must grow the table and retry.
    fn insert_or_get(&mut self, symbol: u8) -> Result<usize, NeedsGrow> {
        let idx = self.slot_for(symbol);
        match self.slots[idx].symbol {
            None => {
                self.slots[idx].symbol = Some(symbol);
                Ok(idx)
            }
            Some(s) if s == symbol => Ok(idx),
            Some(_) => Err(NeedsGrow),
        }
    }

    /// Enlarges to the next modulus in `moduli` (or `k` if none larger
    /// remains) and rehashes existing entries. Moduli form a strictly
    /// increasing sequence terminating at `k`, so this always makes
    /// progress until the table is direct-mapped.
    fn grow(&mut self, moduli: &[u16]) {
        let next = moduli
            .iter()
            .copied()
            .find(|&m| m > self.modulus)
            .unwrap_or(self.k);

        let old = std::mem::replace(&mut self.slots, vec![Slot::default(); next as usize]);
        self.modulus = next;

        for slot in old.into_iter() {
            if let Some(sym) = slot.symbol {
                let idx = self.slot_for(sym);
                self.slots[idx] = slot;
            }
        }
    }

    fn update_max_entry(&mut self, idx: usize) {
        let sym = self.slots[idx].symbol.expect("slot must be occupied");
        let count = self.slots[idx].count;

        let replace = match self.max_entry {
            None => true,
            Some(cur) => {
                let cur_count = self.slots[self.find_slot(cur).expect("max_entry must be present")].count;
                count > cur_count || (count == cur_count && sym > cur)
            }
        };

        if replace {
            self.max_entry = Some(sym);
        }
    }

    pub fn max_prediction(&self) -> Option<(u8, u32)> {
        let sym = self.max_entry?;
        let idx = self.find_slot(sym)?;
        Some((sym, self.slots[idx].count))
    }
}

/// Fixed ascending modulus sequence ending in `k`, doubling from an
/// initial table of 4 slots (or `k`, if `k < 4`).
pub fn moduli_sequence(k: u16) -> Vec<u16> {
    let k = k.max(1);
    let mut seq = Vec::new();
    let mut m = 4u16.min(k);
    while m < k {
        seq.push(m);
        m = m.saturating_mul(4).min(k);
    }
    seq.push(k);
    seq
}

pub struct DictionaryTree {
    pages: Pool<Page>,
    root: u32,
    k: u16,
    moduli: Vec<u16>,
}

impl DictionaryTree {
    pub fn new(k: u16) -> Result<Self> {
        let moduli = moduli_sequence(k);
        let mut pages = Pool::new();
        let root = pages.alloc()?;
        pages.get_mut(root).reset(k, moduli[0]);

        Ok(DictionaryTree {
            pages,
            root,
            k,
            moduli,
        })
    }

    fn alloc_page(&mut self) -> Result<u32> {
        let idx = self.pages.alloc()?;
        self.pages.get_mut(idx).reset(self.k, self.moduli[0]);
        Ok(idx)
    }

    /// Walks to the page for `prior`, creating intermediate pages iff
    /// `create_branches`, then increments the entry for `new_symbol`
    /// (creating it iff `create_branches || !count_leaves`), updating
    /// `max_entry`. Returns whether a new branch was required.
    pub fn increment(
        &mut self,
        prior: &[u8],
        new_symbol: u8,
        create_branches: bool,
        count_leaves: bool,
    ) -> Result<bool> {
        let moduli = self.moduli.clone();
        let mut page_idx = self.root;
        let mut created_branch = false;

        for &sym in prior {
            let slot_idx = self.entry_slot(page_idx, sym, &moduli)?;

            let child = self.pages.get(page_idx).slots[slot_idx].child;
            page_idx = match child {
                Some(c) => c,
                None => {
                    if !create_branches {
                        return Ok(created_branch);
                    }
                    let new_page = self.alloc_page()?;
                    self.pages.get_mut(page_idx).slots[slot_idx].child = Some(new_page);
                    created_branch = true;
                    new_page
                }
            };
        }

        let slot_idx = self.entry_slot(page_idx, new_symbol, &moduli)?;
        if create_branches || !count_leaves {
            self.pages.get_mut(page_idx).slots[slot_idx].count += 1;
            self.pages.get_mut(page_idx).update_max_entry(slot_idx);
        }

        Ok(created_branch)
    }

    /// Finds or creates the slot for `symbol` in the page at `page_idx`,
    /// growing the page's table if the natural slot collides.
    fn entry_slot(&mut self, page_idx: u32, symbol: u8, moduli: &[u16]) -> Result<usize> {
        match self.pages.get_mut(page_idx).insert_or_get(symbol) {
            Ok(idx) => Ok(idx),
            Err(NeedsGrow) => {
                self.pages.get_mut(page_idx).grow(moduli);
                self.pages
                    .get_mut(page_idx)
                    .insert_or_get(symbol)
                    .map_err(|_| ())
                    .or_else(|_| err_exit_code(ExitCode::GeneralFailure, "dictionary: insert failed after grow"))
            }
        }
    }

    /// Returns `(found, max_entry_symbol, count)` for the context
    /// `prior`, or `None` if that context has never been observed.
    pub fn predict(&self, prior: &[u8]) -> Option<(u8, u32)> {
        let mut page_idx = self.root;
        for &sym in prior {
            let page = self.pages.get(page_idx);
            let idx = page.find_slot(sym)?;
            page_idx = page.slots[idx].child?;
        }
        self.pages.get(page_idx).max_prediction()
    }

    /// Number of pages currently allocated, used by callers (LZ78Y) that
    /// bound total dictionary size rather than per-page entry count.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_most_frequent_successor() {
        let mut tree = DictionaryTree::new(4).unwrap();
        // context [1] -> 2 observed twice, -> 3 observed once
        tree.increment(&[1], 2, true, false).unwrap();
        tree.increment(&[1], 2, true, false).unwrap();
        tree.increment(&[1], 3, true, false).unwrap();

        let (sym, count) = tree.predict(&[1]).unwrap();
        assert_eq!(sym, 2);
        assert_eq!(count, 2);
    }

    #[test]
    fn ties_break_to_largest_symbol() {
        let mut tree = DictionaryTree::new(4).unwrap();
        tree.increment(&[0], 1, true, false).unwrap();
        tree.increment(&[0], 2, true, false).unwrap();

        let (sym, _) = tree.predict(&[0]).unwrap();
        assert_eq!(sym, 2);
    }

    #[test]
    fn unseen_context_returns_none() {
        let tree = DictionaryTree::new(4).unwrap();
        assert!(tree.predict(&[0]).is_none());
    }

    #[test]
    fn grows_table_when_many_symbols_collide() {
        let mut tree = DictionaryTree::new(256).unwrap();
        for sym in 0..=255u8 {
            tree.increment(&[], sym, true, false).unwrap();
        }
        for sym in 0..=255u8 {
            assert!(tree.predict(&[]).is_some());
            tree.increment(&[], sym, true, false).unwrap();
        }
    }
}
