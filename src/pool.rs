/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Pool allocator: a block allocator with geometric segment growth,
//! backing the dictionary-tree nodes. A typed arena of fixed-size
//! slots with a free-list, growing by doubling segments rather than one
//! slot at a time.
//!
//! Slots are referenced by `u32` index, never by raw pointer or `Rc` -
//! the arena owns everything and is dropped as a unit (see `DESIGN.md`,
//! "Cyclic references").

use crate::errors::{err_exit_code, ExitCode};
use anyhow::Result;

/// Segment size in slots grows geometrically (doubling) starting from
/// `INITIAL_SEGMENT_SLOTS`, capped so a single segment never exceeds
/// `MAX_SEGMENT_BYTES` (128 MiB, bounding worst-case resident memory).
const INITIAL_SEGMENT_SLOTS: usize = 1024;
const MAX_SEGMENT_BYTES: usize = 128 * 1024 * 1024;

/// A pool of fixed-size `T` slots, never shrinking until the pool itself
/// is dropped. Freed slots are returned to a free-list headed by
/// `next_free`; allocation prefers the free-list before growing.
pub struct Pool<T: Default> {
    segments: Vec<Vec<T>>,
    next_free: Option<u32>,
    free_next: Vec<u32>,
    len: u32,
}

const NIL: u32 = u32::MAX;

impl<T: Default> Pool<T> {
    pub fn new() -> Self {
        Pool {
            segments: Vec::new(),
            next_free: None,
            free_next: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocates a fresh, default-initialized slot and returns its index.
    pub fn alloc(&mut self) -> Result<u32> {
        if let Some(idx) = self.next_free {
            let next = self.free_next[idx as usize];
            self.next_free = if next == NIL { None } else { Some(next) };
            *self.get_mut(idx) = T::default();
            return Ok(idx);
        }

        self.grow_if_needed()?;

        let idx = self.len;
        self.len += 1;
        self.free_next.push(NIL);

        Ok(idx)
    }

    /// Returns a slot to the free-list. The caller must not use `idx`
    /// again until it is re-handed-out by `alloc`.
    pub fn free(&mut self, idx: u32) {
        self.free_next[idx as usize] = self.next_free.unwrap_or(NIL);
        self.next_free = Some(idx);
    }

    pub fn get(&self, idx: u32) -> &T {
        let (seg, offset) = self.locate(idx);
        &self.segments[seg][offset]
    }

    pub fn get_mut(&mut self, idx: u32) -> &mut T {
        let (seg, offset) = self.locate(idx);
        &mut self.segments[seg][offset]
    }

    fn locate(&self, idx: u32) -> (usize, usize) {
        let mut remaining = idx as usize;
        let mut seg_size = INITIAL_SEGMENT_SLOTS;
        let mut seg = 0;
        let mut base = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            if remaining < segment.len() {
                return (i, remaining);
            }
            remaining -= segment.len();
            seg = i + 1;
            base += segment.len();
            seg_size = segment.len();
        }
        let _ = (seg, base, seg_size);
        panic!("pool index {} out of bounds", idx);
    }

    fn grow_if_needed(&mut self) -> Result<()> {
        let occupied: usize = self.segments.iter().map(|s| s.len()).sum();
        if (self.len as usize) < occupied {
            return Ok(());
        }

        let next_size = match self.segments.last() {
            None => INITIAL_SEGMENT_SLOTS,
            Some(last) => last.len() * 2,
        };

        let elem_size = std::mem::size_of::<T>().max(1);
        let next_size = next_size.min(MAX_SEGMENT_BYTES / elem_size).max(1);

        let mut segment = Vec::new();
        segment
            .try_reserve(next_size)
            .map_err(|_| ())
            .or_else(|_| err_exit_code::<()>(ExitCode::OutOfMemory, "pool segment allocation failed"))?;
        segment.resize_with(next_size, T::default);

        self.segments.push(segment);

        Ok(())
    }
}

impl<T: Default> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_reuses_slots() {
        let mut pool: Pool<u32> = Pool::new();
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_ne!(a, b);

        pool.free(a);
        let c = pool.alloc().unwrap();
        assert_eq!(a, c, "freed slot should be reused");
    }

    #[test]
    fn grows_past_one_segment() {
        let mut pool: Pool<u8> = Pool::new();
        let mut indices = Vec::new();
        for _ in 0..(INITIAL_SEGMENT_SLOTS * 3) {
            indices.push(pool.alloc().unwrap());
        }
        for (i, &idx) in indices.iter().enumerate() {
            *pool.get_mut(idx) = (i % 256) as u8;
        }
        for (i, &idx) in indices.iter().enumerate() {
            assert_eq!(*pool.get(idx), (i % 256) as u8);
        }
    }
}
