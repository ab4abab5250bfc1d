// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-size slab allocator.
//!
//! A block holds 64 slots plus a 64-bit free mask; blocks are addressed by
//! index into a growing page table; a tree of 64-way summaries over the
//! page table's "is-full" bits lets `alloc` find a free slot in O(1)
//! amortized time without scanning the whole table, and `free` clears
//! "full" bits back up the tree only as far as necessary.
//!
//! This crate is `forbid(unsafe_code)`, so the slab owns `T` directly
//! rather than pooling raw memory: [`Slab::alloc`] takes the value to
//! store and returns a [`SlotId`]; [`Slab::free`] hands the value back so
//! the caller can drop it (or reuse its parts) explicitly.

use std::collections::VecDeque;

const BLOCK_SLOTS: usize = 64;
const STACK_LIMIT: usize = 1024;
/// Upper bound on summary levels; 64^12 slots is far beyond any realistic
/// workload, so a fixed-size cursor array avoids a heap allocation per level.
const MAX_LEVELS: usize = 12;

/// Opaque handle to a slot inside a [`Slab`]. Only valid for the `Slab` that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

struct Block<T> {
    /// Bit `i` set means slot `i` is free.
    free_mask: u64,
    slots: Vec<Option<T>>,
}

impl<T> Block<T> {
    fn new() -> Self {
        Self {
            free_mask: u64::MAX,
            slots: (0..BLOCK_SLOTS).map(|_| None).collect(),
        }
    }

    fn is_full(&self) -> bool {
        self.free_mask == 0
    }

    fn allocated_count(&self) -> usize {
        (!self.free_mask).count_ones() as usize
    }

    /// Claims the lowest-indexed free slot and returns its index, without
    /// writing a value into it yet.
    fn claim_free_slot(&mut self) -> usize {
        debug_assert!(!self.is_full());
        let idx = self.free_mask.trailing_zeros() as usize;
        self.free_mask &= !(1u64 << idx);
        idx
    }

    fn release_bit(&mut self, idx: usize) {
        let bit = 1u64 << idx;
        debug_assert_eq!(self.free_mask & bit, 0, "double free of slot {idx}");
        self.free_mask |= bit;
    }
}

/// A pool allocator for objects of one type: O(1) amortized `alloc`/`free`,
/// optional `prefetch`, and a `reset` that refuses to discard live
/// allocations.
pub struct Slab<T> {
    blocks: Vec<Option<Block<T>>>,
    /// `tree_levels[level][word]` packs, per bit, whether the child at that
    /// position (a page-table block at level 0, a summary word at higher
    /// levels) is completely full.
    tree_levels: Vec<Vec<u64>>,
    current_roots: [usize; MAX_LEVELS],
    /// Recently-freed slots, reused directly by the next `alloc` without
    /// touching the summary tree. Batches tree maintenance the way the
    /// original's `leafQueue_` does.
    free_queue: VecDeque<SlotId>,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slab<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            tree_levels: vec![vec![0u64]; MAX_LEVELS],
            current_roots: [0; MAX_LEVELS],
            free_queue: VecDeque::new(),
        }
    }

    fn decode(id: SlotId) -> (usize, usize) {
        (id.0 / BLOCK_SLOTS, id.0 % BLOCK_SLOTS)
    }

    fn encode(block_pos: usize, slot_idx: usize) -> SlotId {
        SlotId(block_pos * BLOCK_SLOTS + slot_idx)
    }

    fn ensure_level_len(&mut self, level: usize, word: usize) {
        let level_vec = &mut self.tree_levels[level];
        if level_vec.len() <= word {
            level_vec.resize(word + 1, 0);
        }
    }

    fn ensure_block_exists(&mut self, block_pos: usize) {
        if self.blocks.len() <= block_pos {
            log::trace!(
                "slab page table growing from {} to {} blocks",
                self.blocks.len(),
                block_pos + 1
            );
            self.blocks.resize_with(block_pos + 1, || None);
        }
        if self.blocks[block_pos].is_none() {
            self.blocks[block_pos] = Some(Block::new());
        }
    }

    /// Walks the cursor up while the active summary word is saturated,
    /// then descends taking the lowest free child at each level.
    fn find_free_block_pos(&mut self) -> usize {
        let mut level = 0usize;
        loop {
            self.ensure_level_len(level, self.current_roots[level]);
            if self.tree_levels[level][self.current_roots[level]] != u64::MAX {
                break;
            }
            let bit_in_parent = 1u64 << (self.current_roots[level] & 63);
            level += 1;
            assert!(level < MAX_LEVELS, "slab summary tree exhausted all levels");
            self.ensure_level_len(level, self.current_roots[level]);
            self.tree_levels[level][self.current_roots[level]] |= bit_in_parent;
        }

        while level > 0 {
            let word = self.tree_levels[level][self.current_roots[level]];
            let free_child_pos = (!word).trailing_zeros() as usize + (self.current_roots[level] << 6);
            level -= 1;
            self.current_roots[level] = free_child_pos;
            self.ensure_level_len(level, free_child_pos);
        }

        let word0 = self.tree_levels[0][self.current_roots[0]];
        let pos = (!word0).trailing_zeros() as usize;
        let block_pos = (self.current_roots[0] << 6) + pos;
        self.ensure_block_exists(block_pos);
        block_pos
    }

    /// Allocates a fresh slot and stores `value` in it.
    pub fn alloc(&mut self, value: T) -> SlotId {
        if let Some(id) = self.free_queue.pop_back() {
            let (block_pos, slot_idx) = Self::decode(id);
            let block = self.blocks[block_pos]
                .as_mut()
                .expect("queued slot must reference a live block");
            debug_assert!(block.slots[slot_idx].is_none());
            block.slots[slot_idx] = Some(value);
            return id;
        }

        let block_pos = self.find_free_block_pos();
        let block = self.blocks[block_pos].as_mut().expect("just ensured");
        let slot_idx = block.claim_free_slot();
        block.slots[slot_idx] = Some(value);

        if block.is_full() {
            let bit_in_parent = 1u64 << (block_pos & 63);
            let word = self.current_roots[0];
            self.ensure_level_len(0, word);
            self.tree_levels[0][word] |= bit_in_parent;
        }

        Self::encode(block_pos, slot_idx)
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> &T {
        let (block_pos, slot_idx) = Self::decode(id);
        self.blocks[block_pos].as_ref().expect("unknown slot").slots[slot_idx]
            .as_ref()
            .expect("slot is not allocated")
    }

    #[must_use]
    pub fn get_mut(&mut self, id: SlotId) -> &mut T {
        let (block_pos, slot_idx) = Self::decode(id);
        self.blocks[block_pos].as_mut().expect("unknown slot").slots[slot_idx]
            .as_mut()
            .expect("slot is not allocated")
    }

    /// Recycles `id`, returning the value that was stored there.
    pub fn free(&mut self, id: SlotId) -> T {
        let (block_pos, slot_idx) = Self::decode(id);
        let block = self.blocks[block_pos].as_mut().expect("freeing unknown slot");
        let value = block.slots[slot_idx].take().expect("double free");

        self.free_queue.push_back(id);
        while self.free_queue.len() > STACK_LIMIT {
            self.free_internal();
        }

        value
    }

    /// Actually clears the free-mask bit (and propagates up the summary
    /// tree) for the oldest queued free. Called once the deferred-free
    /// queue overflows `STACK_LIMIT`, batching tree maintenance.
    fn free_internal(&mut self) {
        let id = self.free_queue.pop_front().expect("called only when non-empty");
        let (block_pos, slot_idx) = Self::decode(id);

        let mut was_full = {
            let block = self.blocks[block_pos].as_mut().expect("block missing");
            let was_full = block.is_full();
            block.release_bit(slot_idx);
            was_full
        };

        let mut idx = block_pos;
        let mut level = 0usize;
        while was_full {
            let bit = 1u64 << (idx & 63);
            idx >>= 6;
            self.ensure_level_len(level, idx);
            was_full = self.tree_levels[level][idx] == u64::MAX;
            self.tree_levels[level][idx] &= !bit;
            level += 1;
        }
    }

    /// Live slot count: `allocated_count() == allocated - freed` at every
    /// point in time.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        let raw: usize = self
            .blocks
            .iter()
            .filter_map(|b| b.as_ref())
            .map(Block::allocated_count)
            .sum();
        raw - self.free_queue.len()
    }

    /// Reserves at least `slots` slots up front so the first `slots`
    /// allocations do no page-table growth.
    pub fn prefetch(&mut self, slots: usize) {
        let needed_blocks = slots.div_ceil(BLOCK_SLOTS);
        if self.blocks.len() < needed_blocks {
            self.blocks.resize_with(needed_blocks, || None);
        }
        for block in &mut self.blocks {
            if block.is_none() {
                *block = Some(Block::new());
            }
        }
    }

    /// Discards all pages. Fails with `Err` (rather than silently losing
    /// live data) if any slot is still allocated.
    pub fn reset(&mut self) -> Result<(), &'static str> {
        while !self.free_queue.is_empty() {
            self.free_internal();
        }
        if self.allocated_count() != 0 {
            log::error!(
                "refusing to reset slab: {} objects still allocated",
                self.allocated_count()
            );
            return Err("cannot reset a slab while it contains allocated objects");
        }
        self.blocks.clear();
        self.tree_levels = vec![vec![0u64]; MAX_LEVELS];
        self.current_roots = [0; MAX_LEVELS];
        Ok(())
    }
}
