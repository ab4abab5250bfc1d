// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-capacity leaf nodes.
//!
//! A `Leaf` is a window `(storage, offset, length, capacity)` over backing
//! storage supplied by a [`crate::storage::LeafStorageAdapter`]. It never
//! touches raw memory itself: every read, write, append, or freeze call
//! forwards to the adapter, which is free to back the window with a plain
//! dense array or an index into an external block space.

use crate::storage::LeafStorageAdapter;

/// A fixed-capacity run of elements, height 0 in the tree.
pub struct Leaf<T, A: LeafStorageAdapter<T>> {
    storage: A::Storage,
    offset: usize,
    length: usize,
    capacity: usize,
}

impl<T, A: LeafStorageAdapter<T>> Leaf<T, A> {
    /// Creates a fresh, empty, mutable leaf of the given capacity.
    #[must_use]
    pub fn create(ctx: &A::Context, capacity: usize) -> Self {
        Self {
            storage: A::create_leaf(ctx, capacity),
            offset: 0,
            length: 0,
            capacity,
        }
    }

    /// Wraps already-built storage as a leaf window. Used when thawing or
    /// when an adapter constructs storage out-of-band (e.g. the index
    /// adapter allocating a block up front).
    #[must_use]
    pub fn from_storage(storage: A::Storage, offset: usize, length: usize, capacity: usize) -> Self {
        Self {
            storage,
            offset,
            length,
            capacity,
        }
    }

    #[must_use]
    pub fn height(&self) -> i8 {
        0
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.length
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn get(&self, pos: usize) -> T {
        A::at(&self.storage, self.offset + pos)
    }

    pub fn set_at(&mut self, pos: usize, value: T) {
        A::set_at(&mut self.storage, self.offset + pos, value);
    }

    /// Appends `source` to the front or back of the window. A prefix append
    /// that needs more room than the current offset provides shifts the
    /// live window forward first; a suffix append that would overrun
    /// capacity compacts the window back to offset zero first.
    pub fn append(&mut self, source: &[T], as_prefix: bool)
    where
        T: Clone,
    {
        let length = source.len();
        assert!(
            self.length + length <= self.capacity,
            "leaf append would exceed capacity"
        );
        if as_prefix {
            if length > self.offset {
                A::shift_data(&mut self.storage, self.offset, length, self.length);
                self.offset = length;
            }
            A::set_values(&mut self.storage, self.offset - length, source, length);
            self.offset -= length;
        } else {
            if self.length + length + self.offset > self.capacity {
                A::shift_data(&mut self.storage, self.offset, 0, self.length);
                self.offset = 0;
            }
            A::set_values(&mut self.storage, self.length + self.offset, source, length);
        }
        self.length += length;
    }

    /// Appends a run copied from another leaf's window.
    pub fn append_from(&mut self, src: &Self, offset: usize, len: usize, as_prefix: bool) {
        let offset = offset.min(src.length);
        let len = len.min(src.length - offset);
        assert!(
            self.length + len <= self.capacity,
            "leaf append_from would exceed capacity"
        );
        if as_prefix {
            if len > self.offset {
                A::shift_data(&mut self.storage, self.offset, len, self.length);
                self.offset = len;
            }
            A::copy(&mut self.storage, self.offset - len, &src.storage, offset + src.offset, len);
            self.offset -= len;
        } else {
            if self.length + len + self.offset > self.capacity {
                A::shift_data(&mut self.storage, self.offset, 0, self.length);
                self.offset = 0;
            }
            A::copy(&mut self.storage, self.length + self.offset, &src.storage, offset + src.offset, len);
        }
        self.length += len;
    }

    /// Narrows the window in place. Does not touch the backing storage, so
    /// a frozen leaf can be sliced for free; the hidden-but-still-allocated
    /// slots stay reachable through a wider sibling window sharing the same
    /// storage.
    pub fn slice(&mut self, offset: usize, len: usize) {
        assert!(
            offset + len <= self.length,
            "leaf slice out of the current window's bounds"
        );
        self.offset += offset;
        self.length = len;
    }

    /// Thaws this leaf's storage into an exclusively-owned mutable copy.
    pub fn mutate(&mut self, ctx: &A::Context) {
        self.storage = A::mutate(&self.storage, ctx);
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        !A::is_mutable(&self.storage)
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        A::is_mutable(&self.storage)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        A::is_null(&self.storage)
    }

    /// Test-only escape hatch for inspecting storage identity directly in
    /// sharing property tests; not exposed outside the crate.
    #[cfg(test)]
    pub(crate) fn storage_for_test(&self) -> &A::Storage {
        &self.storage
    }

    /// Slots still free in the live window; `0` once frozen, since a frozen
    /// leaf accepts no further in-place writes.
    #[must_use]
    pub fn available(&self) -> usize {
        if !self.is_mutable() {
            return 0;
        }
        self.capacity - self.length - self.offset
    }

    /// Freezes this leaf's storage, consuming it and returning the frozen
    /// form. Taking `self` by value (rather than `&mut self`) sidesteps
    /// needing a placeholder value for `A::Storage` while the real one is
    /// being transformed.
    #[must_use]
    pub fn make_const(self) -> Self {
        Self {
            storage: A::make_const(self.storage),
            offset: self.offset,
            length: self.length,
            capacity: self.capacity,
        }
    }

    /// Leaves have no seams to freeze; this exists only so `BNode`/`ANode`
    /// can call it uniformly across child heights.
    pub fn make_seam_const(&mut self, _on_front: bool) {}

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.length >= self.capacity / 2
    }

    #[must_use]
    pub fn is_one_side_balanced(&self, is_root: bool, _on_front: bool) -> bool {
        is_root || self.is_balanced()
    }

    #[must_use]
    pub fn is_deep_balanced(&self, is_root: bool) -> bool {
        is_root || self.is_balanced()
    }

    /// Bulk-reads up to `length` elements starting at `offset` into `dest`,
    /// returning how many were actually copied.
    pub fn fill(&self, dest: &mut [T], offset: usize, length: usize) -> usize {
        if offset > self.length {
            return 0;
        }
        let length = length.min(self.length - offset);
        A::get_values(&mut dest[..length], &self.storage, offset + self.offset, length);
        length
    }

    /// Bulk-writes up to `length` elements from `src` starting at `offset`.
    pub fn set_values(&mut self, src: &[T], offset: usize, length: usize) -> usize {
        if offset > self.length {
            return 0;
        }
        let length = length.min(self.length - offset);
        A::set_values(&mut self.storage, offset + self.offset, &src[..length], length);
        length
    }
}

impl<T, A: LeafStorageAdapter<T>> Clone for Leaf<T, A> {
    /// A frozen leaf clones its storage handle cheaply (an `Arc` bump in the
    /// dense adapter); a mutable leaf deep-copies its storage instead.
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            offset: self.offset,
            length: self.length,
            capacity: self.capacity,
        }
    }
}
