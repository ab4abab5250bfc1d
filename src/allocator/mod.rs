// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Pool allocation for the tree's node classes.

mod slab;

pub use slab::{Slab, SlotId};

/// One [`Slab`] per object class that actually churns during tree
/// composition. `Leaf` storage buffers and `BNode` child vectors are
/// reallocated constantly while a [`crate::Builder`] is splicing subtrees
/// together, so those are the two classes pooled here; frozen, `Arc`-shared
/// nodes are reclaimed by ordinary reference counting instead (see
/// `DESIGN.md`).
pub struct NodePool<L, B> {
    leaves: Slab<L>,
    bnodes: Slab<B>,
}

impl<L, B> Default for NodePool<L, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L, B> NodePool<L, B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            leaves: Slab::new(),
            bnodes: Slab::new(),
        }
    }

    pub fn alloc_leaf(&mut self, value: L) -> SlotId {
        self.leaves.alloc(value)
    }

    pub fn free_leaf(&mut self, id: SlotId) -> L {
        self.leaves.free(id)
    }

    pub fn alloc_bnode(&mut self, value: B) -> SlotId {
        self.bnodes.alloc(value)
    }

    pub fn free_bnode(&mut self, id: SlotId) -> B {
        self.bnodes.free(id)
    }

    pub fn prefetch(&mut self, leaves: usize, bnodes: usize) {
        self.leaves.prefetch(leaves);
        self.bnodes.prefetch(bnodes);
    }

    #[must_use]
    pub fn allocated_count(&self) -> (usize, usize) {
        (self.leaves.allocated_count(), self.bnodes.allocated_count())
    }

    pub fn reset(&mut self) -> Result<(), &'static str> {
        self.leaves.reset()?;
        self.bnodes.reset()?;
        Ok(())
    }
}
