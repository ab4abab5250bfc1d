// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The public facade over a tree: a handle that looks like an ordered,
//! indexable, sliceable, concatenable sequence, backed by whichever of
//! [`crate::leaf::Leaf`], [`crate::node::bnode::BNode`], or
//! [`crate::node::anode::ANode`] its root currently is.

use crate::builder::Builder;
use crate::node::Child;
use crate::shape::Shape;
use crate::storage::LeafStorageAdapter;
use std::sync::Arc;

/// A persistent, copy-on-write ordered sequence of `T`.
///
/// Cloning a `Sequence` is O(1): it shares its root with the clone, and
/// both only pay a copy cost on the next edit that actually touches shared
/// structure (handled internally by [`Builder`]).
pub struct Sequence<T, A: LeafStorageAdapter<T>> {
    shape: Shape,
    ctx: Arc<A::Context>,
    root: Child<T, A>,
}

impl<T: Clone, A: LeafStorageAdapter<T>> Sequence<T, A> {
    /// An empty sequence.
    #[must_use]
    pub fn new(shape: Shape, ctx: A::Context) -> Self {
        let ctx = Arc::new(ctx);
        let root = crate::leaf::Leaf::<T, A>::create(&ctx, shape.s).make_const();
        Self {
            shape,
            ctx,
            root: Child::FrozenLeaf(Arc::new(root)),
        }
    }

    fn builder(&self) -> Builder<T, A> {
        Builder::new(self.shape, Arc::clone(&self.ctx))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.root.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn height(&self) -> i8 {
        self.root.height()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> T {
        self.root.get(index)
    }

    /// Bulk-reads `[offset, offset + length)` into `dest`, returning how
    /// many elements were actually copied.
    pub fn fill(&self, dest: &mut [T], offset: usize, length: usize) -> usize {
        self.root.fill(dest, offset, length)
    }

    /// Appends `values` to the back.
    pub fn append(&mut self, values: &[T]) {
        let mut builder = self.builder();
        builder.add_node(self.root.copy_node(), false);
        builder.push_run(values);
        self.root = builder.close(true).expect("appending never requires a non-annotated root");
    }

    /// Prepends `values` to the front.
    pub fn prepend(&mut self, values: &[T]) {
        let mut builder = self.builder();
        let mut prefix_leaf = crate::leaf::Leaf::<T, A>::create(&self.ctx, self.shape.s.max(values.len()));
        prefix_leaf.append(values, false);
        builder.add_node(Child::MutLeaf(Box::new(prefix_leaf)), false);
        builder.add_node(self.root.copy_node(), false);
        self.root = builder.close(true).expect("prepending never requires a non-annotated root");
    }

    /// Concatenates `other` onto the back of `self`, consuming neither (both
    /// keep sharing whatever subtrees they already shared).
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut builder = self.builder();
        builder.add_node(self.root.copy_node(), false);
        builder.add_node(other.root.copy_node(), false);
        let root = builder.close(true).expect("concatenation never requires a non-annotated root");
        Self {
            shape: self.shape,
            ctx: Arc::clone(&self.ctx),
            root,
        }
    }

    /// Returns the sub-sequence `[offset, offset + len)` as a new,
    /// independent `Sequence` that shares storage with `self`.
    ///
    /// A window that lands inside a single leaf narrows that leaf in place
    /// (an `Arc` bump); a wider window reference-copies every child it
    /// fully covers and only recurses into the two children its edges
    /// cross, so this stays proportional to the tree's height, not its
    /// size.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.len(), "slice range out of bounds");
        let mut builder = self.builder();
        builder.add_node_range(&self.root, offset, len, false);
        let root = builder.close(true).expect("slicing never requires a non-annotated root");
        Self {
            shape: self.shape,
            ctx: Arc::clone(&self.ctx),
            root,
        }
    }

    /// Overwrites `values.len()` elements starting at `offset` in place.
    ///
    /// Builds the replacement run once, then asks the [`Builder`] to splice
    /// it in, which tries a transient annotated-overlay fast path before
    /// falling back to extracting the untouched head/tail and
    /// re-concatenating around the patch; either way, anything outside
    /// `[offset, offset + values.len())` stays shared with every other
    /// handle to the old version.
    pub fn overwrite(&mut self, offset: usize, values: &[T]) {
        let len = values.len();
        assert!(offset + len <= self.len(), "overwrite range out of bounds");
        if len == 0 {
            return;
        }

        let mut patch_builder = Builder::new(self.shape, Arc::clone(&self.ctx));
        patch_builder.push_run(values);
        let patch = patch_builder
            .close(true)
            .expect("building an overwrite patch never requires a non-annotated root");

        let mut builder = self.builder();
        self.root = builder
            .overwrite_range(&self.root, offset, patch)
            .expect("overwrite never requires a non-annotated root");
    }
}

impl<T: Clone, A> Sequence<T, A>
where
    A: LeafStorageAdapter<T>,
{
    /// Convenience constructor for tests and examples: builds a sequence
    /// from a plain slice in one pass.
    #[must_use]
    pub fn from_slice(shape: Shape, ctx: &A::Context, values: &[T]) -> Self
    where
        A::Context: Clone,
    {
        let ctx = Arc::new(ctx.clone());
        let mut builder = Builder::new(shape, Arc::clone(&ctx));
        builder.push_run(values);
        let root = builder.close(true).expect("building from a slice never requires a non-annotated root");
        Self { shape, ctx, root }
    }
}

impl<T: Clone, A: LeafStorageAdapter<T>> Clone for Sequence<T, A> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            ctx: Arc::clone(&self.ctx),
            root: self.root.copy_node(),
        }
    }
}
