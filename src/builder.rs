// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The incremental tree constructor: splices already-built subtrees
//! together while keeping exactly one mutable seam open, so a long run of
//! `add_node` calls does `O(1)` amortized work per call instead of
//! rebuilding the whole tree on each step.
//!
//! The core splicing machinery is two pieces: [`Builder::merge`] (a
//! height-aware concatenation that either splices directly into an open
//! mutable [`BNode`] seam, thaws a frozen one under the mutation-level
//! budget, or wraps a new parent above both sides) and [`Builder::close`]
//! (a pruning pass that collapses single-child parents and pushes down any
//! annotated root before freezing). See `DESIGN.md` for the case-by-case
//! grounding.

use crate::error::{Error, Result};
use crate::leaf::Leaf;
use crate::node::anode::{ANode, Origin};
use crate::node::bnode::BNode;
use crate::node::Child;
use crate::shape::Shape;
use crate::storage::LeafStorageAdapter;
use std::sync::Arc;

/// Incremental constructor for one [`crate::Sequence`] edit.
///
/// `ctx` is shared (`Arc`) rather than owned because a [`crate::Sequence`]
/// keeps using the same adapter context across every edit it makes over its
/// lifetime, not just the one that creates a `Builder`.
pub struct Builder<T, A: LeafStorageAdapter<T>> {
    shape: Shape,
    ctx: Arc<A::Context>,
    root: Option<Child<T, A>>,
    /// Caps how deep below the surface a seam may stay exclusively mutable;
    /// `None` means unbounded. A bounded builder will not thaw a frozen
    /// `BNode` taller than this to splice a sibling into it, falling back
    /// to wrapping a new parent instead.
    max_mutation_level: Option<i8>,
}

impl<T: Clone, A: LeafStorageAdapter<T>> Builder<T, A> {
    #[must_use]
    pub fn new(shape: Shape, ctx: Arc<A::Context>) -> Self {
        Self {
            shape,
            ctx,
            root: None,
            max_mutation_level: None,
        }
    }

    #[must_use]
    pub fn with_max_mutation_level(shape: Shape, ctx: Arc<A::Context>, max_mutation_level: i8) -> Self {
        Self {
            shape,
            ctx,
            root: None,
            max_mutation_level: Some(max_mutation_level),
        }
    }

    /// Whether a frozen `BNode` at `height` may be thawed in place rather
    /// than left untouched behind a new wrapping parent.
    fn may_mutate_at(&self, height: i8) -> bool {
        self.max_mutation_level.map_or(true, |m| height <= m)
    }

    #[must_use]
    pub fn context(&self) -> &A::Context {
        &self.ctx
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.root.as_ref().map_or(0, Child::size)
    }

    #[must_use]
    pub fn height(&self) -> i8 {
        self.root.as_ref().map_or(0, Child::height)
    }

    /// Appends a single element to the back, starting or extending a
    /// mutable leaf at the tail of the current seam.
    pub fn push(&mut self, value: T) {
        self.push_run(std::slice::from_ref(&value));
    }

    /// Appends a run of elements to the back.
    pub fn push_run(&mut self, values: &[T]) {
        if values.is_empty() {
            return;
        }
        if let Some(Child::MutLeaf(leaf)) = &mut self.root {
            let available = leaf.available();
            if available > 0 {
                let take = available.min(values.len());
                leaf.append(&values[..take], false);
                if take == values.len() {
                    return;
                }
                let mut new_leaf = Leaf::<T, A>::create(&self.ctx, self.shape.s);
                new_leaf.append(&values[take..], false);
                let existing = self.root.take().expect("checked Some above");
                self.root = Some(self.merge(existing, Child::MutLeaf(Box::new(new_leaf)), false));
                return;
            }
        }
        let mut leaf = Leaf::<T, A>::create(&self.ctx, self.shape.s);
        leaf.append(values, false);
        self.add_node(Child::MutLeaf(Box::new(leaf)), false);
    }

    /// Splices an already-built subtree into the open seam, at the front
    /// (`as_prefix`) or the back.
    pub fn add_node(&mut self, node: Child<T, A>, as_prefix: bool) {
        if node.size() == 0 {
            return;
        }
        match self.root.take() {
            None => self.root = Some(node),
            Some(existing) => self.root = Some(self.merge(existing, node, as_prefix)),
        }
    }

    /// Splices the window `[offset, offset + length)` of `node` into the
    /// open seam. Unlike `add_node`, `node` is borrowed rather than
    /// consumed: `node` may still be `self`'s own root, as it is when
    /// `Sequence::slice`/`overwrite` extract a sub-window of the very tree
    /// they are about to replace.
    ///
    /// Whatever of `node` falls entirely inside or outside the window is
    /// shared by reference (`Child::copy_node`) rather than copied
    /// element-by-element; only subtrees straddling a window boundary are
    /// rebuilt, so this stays proportional to the number of nodes the
    /// window's edges cross, not to `length` itself.
    pub fn add_node_range(&mut self, node: &Child<T, A>, offset: usize, length: usize, as_prefix: bool) {
        if length == 0 {
            return;
        }
        let piece = extract_range(&self.ctx, self.shape, node, offset, length);
        self.add_node(piece, as_prefix);
    }

    /// Concatenates `existing` and `incoming` (ordered with `incoming`
    /// first when `as_prefix`), producing one subtree whose height is
    /// within one of the taller side's.
    fn merge(&self, existing: Child<T, A>, incoming: Child<T, A>, as_prefix: bool) -> Child<T, A> {
        let (left, right) = if as_prefix { (incoming, existing) } else { (existing, incoming) };
        let left_h = left.height();
        let right_h = right.height();

        if left_h == right_h {
            if let Some(merged) = self.merge_small_leaves(&left, &right) {
                return merged;
            }
            if let (Child::MutBNode(lb), Child::MutBNode(rb)) = (&left, &right) {
                if lb.children_count() + rb.children_count() <= self.shape.max {
                    let (Child::MutBNode(mut lb), Child::MutBNode(mut rb)) = (left, right) else {
                        unreachable!("matched immutably above");
                    };
                    let count = rb.children_count();
                    lb.move_nodes(&mut rb, 0, lb.children_count(), count);
                    return Child::MutBNode(lb);
                }
            }
            return self.wrap_siblings(left, right);
        }

        if left_h > right_h {
            if left_h - right_h == 1 {
                return self.splice_into_bnode(left, right, false);
            }
            return self.wrap_siblings(left, right);
        }

        if right_h - left_h == 1 {
            return self.splice_into_bnode(right, left, true);
        }
        self.wrap_siblings(left, right)
    }

    /// Two adjacent leaves that together still fit in one leaf's capacity
    /// are merged by copying both into a fresh leaf, rather than wrapped
    /// under a new `BNode` parent of height 1 holding just the two of them.
    fn merge_small_leaves(&self, left: &Child<T, A>, right: &Child<T, A>) -> Option<Child<T, A>> {
        if left.height() != 0 || right.height() != 0 {
            return None;
        }
        let combined = left.size() + right.size();
        if combined == 0 || combined > self.shape.s {
            return None;
        }
        let mut merged = Leaf::<T, A>::create(&self.ctx, self.shape.s);
        let left_values: Vec<T> = (0..left.size()).map(|i| left.get(i)).collect();
        let right_values: Vec<T> = (0..right.size()).map(|i| right.get(i)).collect();
        merged.append(&left_values, false);
        merged.append(&right_values, false);
        Some(Child::MutLeaf(Box::new(merged)))
    }

    /// Splices `incoming` (exactly one height below `parent`) into
    /// `parent`'s child list when there's room, either by mutating it
    /// directly (already mutable, or a frozen `BNode` thawed under the
    /// mutation-level budget) or by wrapping a new sibling parent above
    /// both.
    fn splice_into_bnode(&self, parent: Child<T, A>, incoming: Child<T, A>, incoming_is_prefix: bool) -> Child<T, A> {
        match parent {
            Child::MutBNode(mut b) => {
                if b.children_count() < self.shape.max {
                    b.add_node(incoming, incoming_is_prefix);
                    return Child::MutBNode(b);
                }
                self.wrap_for(Child::MutBNode(b), incoming, incoming_is_prefix)
            }
            Child::FrozenBNode(fb) if self.may_mutate_at(fb.height()) && fb.children_count() < self.shape.max => {
                let mut thawed = (*fb).clone();
                thawed.add_node(incoming, incoming_is_prefix);
                Child::MutBNode(Box::new(thawed))
            }
            other => self.wrap_for(other, incoming, incoming_is_prefix),
        }
    }

    fn wrap_for(&self, parent: Child<T, A>, incoming: Child<T, A>, incoming_is_prefix: bool) -> Child<T, A> {
        if incoming_is_prefix {
            self.wrap_siblings(incoming, parent)
        } else {
            self.wrap_siblings(parent, incoming)
        }
    }

    fn wrap_siblings(&self, left: Child<T, A>, right: Child<T, A>) -> Child<T, A> {
        let height = left.height().max(right.height()) + 1;
        debug_assert!(
            usize::try_from(height).unwrap_or(usize::MAX) <= self.shape.max_height(),
            "tree height exceeded the shape's computed upper bound"
        );
        let mut parent = BNode::<T, A>::new(self.shape, height);
        if left.height() == height - 1 {
            parent.add_node(left, false);
        } else {
            parent.add_node(Child::MutBNode(Box::new(self.lift(left, height - 1))), false);
        }
        if right.height() == height - 1 {
            parent.add_node(right, false);
        } else {
            parent.add_node(Child::MutBNode(Box::new(self.lift(right, height - 1))), false);
        }
        Child::MutBNode(Box::new(parent))
    }

    /// Wraps a child under a chain of single-child parents until it reaches
    /// `target_height`. Produces a temporarily under-filled spine; `close`
    /// prunes any single-child parent left over once the edit settles.
    fn lift(&self, child: Child<T, A>, target_height: i8) -> BNode<T, A> {
        let mut height = child.height() + 1;
        let mut node = BNode::<T, A>::new(self.shape, height);
        node.add_node(child, false);
        while height < target_height {
            height += 1;
            let mut outer = BNode::<T, A>::new(self.shape, height);
            outer.add_node(Child::MutBNode(Box::new(node)), false);
            node = outer;
        }
        node
    }

    /// Tries to express overwriting `[offset, offset + length)` of `root`
    /// with `patch` as a transient `ANode` overlay, immediately flattened
    /// back into a concrete child. Returns `patch` unchanged (as `Err`) if
    /// `root` isn't frozen or the overlay can't fit, so the caller can fall
    /// back to rebuilding around it instead.
    fn try_overlay(
        &self,
        root: &Child<T, A>,
        offset: usize,
        length: usize,
        patch: Child<T, A>,
    ) -> std::result::Result<Child<T, A>, Child<T, A>> {
        let origin = match root {
            Child::FrozenLeaf(l) => Origin::Leaf(Arc::clone(l)),
            Child::FrozenBNode(b) => Origin::BNode(Arc::clone(b)),
            _ => return Err(patch),
        };
        let mut anode = ANode::new(self.shape, origin);
        if !anode.can_accept(offset, length, patch.height()) {
            return Err(patch);
        }
        anode.add_node(patch, offset, length);
        Ok(extract_from_anode(&self.ctx, self.shape, &anode, 0, anode.size()))
    }

    /// Replaces `[offset, offset + patch.size())` of `root` with `patch`,
    /// preferring the overlay fast path of [`Builder::try_overlay`] and
    /// otherwise extracting the untouched head/tail and re-concatenating
    /// around `patch`, the same way `Sequence::slice` does.
    pub fn overwrite_range(&mut self, root: &Child<T, A>, offset: usize, patch: Child<T, A>) -> Result<Child<T, A>> {
        let length = patch.size();
        let patch = match self.try_overlay(root, offset, length, patch) {
            Ok(flattened) => return Ok(flattened),
            Err(patch) => patch,
        };

        if offset > 0 {
            self.add_node_range(root, 0, offset, false);
        }
        self.add_node(patch, false);
        let tail_offset = offset + length;
        let tail_len = root.size() - tail_offset;
        if tail_len > 0 {
            self.add_node_range(root, tail_offset, tail_len, false);
        }
        self.close(true)
    }

    /// Flattens an annotated overlay root, if there is one, back into a
    /// concrete `Leaf`/`BNode` — so a caller that cannot tolerate an
    /// `ANode` root (e.g. [`Builder::close`] with `allow_annotated_root =
    /// false`) gets back something it can use.
    pub fn push_down_annotations(&mut self) -> Result<()> {
        if let Some(Child::FrozenANode(anode)) = &self.root {
            log::debug!(
                "pushing down annotation root (height {}, {} overlays) before close",
                anode.height(),
                anode.overlay_count()
            );
            self.root = Some(extract_from_anode(&self.ctx, self.shape, anode, 0, anode.size()));
        }
        Ok(())
    }

    /// Finishes this edit: prunes single-child parents left over from
    /// [`Builder::lift`], pushes down an annotated root if the caller
    /// doesn't accept one, then freezes the whole seam.
    ///
    /// `allow_annotated_root`: when `false`, a final root that is still an
    /// [`crate::node::anode::ANode`] after push-down is rejected rather
    /// than silently returned, because some callers (a top-level
    /// [`crate::Sequence`]) require the root to be a plain leaf or `BNode`.
    pub fn close(mut self, allow_annotated_root: bool) -> Result<Child<T, A>> {
        while let Some(Child::MutBNode(b)) = &self.root {
            if b.children_count() != 1 {
                break;
            }
            let Some(Child::MutBNode(mut b)) = self.root.take() else {
                unreachable!("matched above");
            };
            self.root = Some(b.remove_node(false));
        }
        if !allow_annotated_root {
            self.push_down_annotations()?;
        }
        let root = self.root.take().unwrap_or_else(|| Child::MutLeaf(Box::new(Leaf::create(&self.ctx, self.shape.s))));
        #[cfg(feature = "invariant-checks")]
        let size_before = root.size();
        let frozen = root.make_const();
        if !allow_annotated_root && matches!(frozen, Child::FrozenANode(_)) {
            return Err(Error::LogicError("closed root may not be an annotated node here"));
        }
        #[cfg(feature = "invariant-checks")]
        {
            if frozen.size() != size_before {
                log::error!("make_const changed the root's size from {size_before} to {}", frozen.size());
                return Err(Error::InvariantViolation("make_const changed the root's size"));
            }
            if !frozen.is_const() {
                log::error!("close produced a root that is not fully frozen");
                return Err(Error::InvariantViolation("close produced a root that is not fully frozen"));
            }
            if !frozen.is_deep_balanced(true) {
                log::error!("close produced a root that fails the deep-balance invariant");
                return Err(Error::InvariantViolation("close produced a root that is not deep balanced"));
            }
        }
        Ok(frozen)
    }
}

/// Extracts the logical window `[offset, offset + length)` of `node` as a
/// standalone, independently owned subtree, sharing as much of `node`'s
/// existing storage as the window's boundaries allow.
///
/// This is the recursive core behind [`Builder::add_node_range`] and, via
/// it, `Sequence::slice`/`Sequence::overwrite`: a leaf is narrowed in place
/// (an `Arc` bump plus two integer fields); a whole child fully inside the
/// window is reference-copied ([`Child::copy_node`]); only a child
/// straddling a window edge is recursed into, and only its own straddling
/// edge pays any further cost.
pub(crate) fn extract_range<T: Clone, A: LeafStorageAdapter<T>>(
    ctx: &Arc<A::Context>,
    shape: Shape,
    node: &Child<T, A>,
    offset: usize,
    length: usize,
) -> Child<T, A> {
    if length == 0 {
        return Child::MutLeaf(Box::new(Leaf::create(ctx, shape.s)));
    }
    match node {
        Child::MutLeaf(leaf) => {
            let mut narrowed = (**leaf).clone();
            narrowed.slice(offset, length);
            Child::MutLeaf(Box::new(narrowed))
        }
        Child::FrozenLeaf(leaf) => {
            let mut narrowed = (**leaf).clone();
            narrowed.slice(offset, length);
            Child::FrozenLeaf(Arc::new(narrowed))
        }
        Child::MutBNode(bnode) => extract_from_bnode(ctx, shape, bnode, offset, length),
        Child::FrozenBNode(bnode) => extract_from_bnode(ctx, shape, bnode, offset, length),
        Child::FrozenANode(anode) => extract_from_anode(ctx, shape, anode, offset, length),
    }
}

fn extract_from_bnode<T: Clone, A: LeafStorageAdapter<T>>(
    ctx: &Arc<A::Context>,
    shape: Shape,
    bnode: &BNode<T, A>,
    offset: usize,
    length: usize,
) -> Child<T, A> {
    let mut builder = Builder::<T, A>::new(shape, Arc::clone(ctx));
    let mut pos = bnode.lower_bound_pos(offset + 1);
    let mut cursor = offset;
    let mut remaining = length;
    while remaining > 0 && pos < bnode.children_count() {
        let child_start = bnode.child_start(pos);
        let child_size = bnode.size_at(pos);
        let local_offset = cursor - child_start;
        let local_len = (child_size - local_offset).min(remaining);
        let piece = if local_offset == 0 && local_len == child_size {
            bnode.child_at(pos).copy_node()
        } else {
            extract_range(ctx, shape, bnode.child_at(pos), local_offset, local_len)
        };
        builder.add_node(piece, false);
        cursor += local_len;
        remaining -= local_len;
        pos += 1;
    }
    builder
        .close(true)
        .expect("extracting a range from a BNode never requires a non-annotated root")
}

/// Rebuilds the window `[offset, offset + length)` of an `ANode`'s
/// flattened view, used both by plain range extraction and to push an
/// overlay root back down into a concrete child. The sub-`Builder` bounds
/// `max_mutation_level` to one below the `ANode`'s own height, so its
/// merge logic never thaws a frozen `BNode` as tall as (or taller than)
/// the origin this overlay already sits on top of.
fn extract_from_anode<T: Clone, A: LeafStorageAdapter<T>>(
    ctx: &Arc<A::Context>,
    shape: Shape,
    anode: &ANode<T, A>,
    offset: usize,
    length: usize,
) -> Child<T, A> {
    let mut builder = Builder::<T, A>::with_max_mutation_level(shape, Arc::clone(ctx), anode.height() - 1);
    anode.for_each_child(offset, length, |child, origin_abs_offset, local_offset, local_len| {
        let piece = match child {
            Some(overlay) => extract_range(ctx, shape, overlay, local_offset, local_len),
            None => extract_range(ctx, shape, &anode.origin_as_child(), origin_abs_offset, local_len),
        };
        builder.add_node(piece, false);
    });
    builder
        .close(true)
        .expect("extracting a range from an ANode never requires a non-annotated root")
}

#[cfg(test)]
mod tests {
    use super::Builder;
    use crate::node::Child;
    use crate::shape::Shape;
    use crate::storage::DenseAdapter;

    #[test]
    fn push_run_across_many_leaves_preserves_order() {
        let shape = Shape::new(4, 4);
        let mut builder = Builder::<i32, DenseAdapter<i32>>::new(shape, std::sync::Arc::new(()));
        let values: Vec<i32> = (0..37).collect();
        for v in &values {
            builder.push(*v);
        }
        assert_eq!(builder.size(), values.len());
        let root = builder.close(true).expect("close should succeed");
        let mut out = vec![0; values.len()];
        root.fill(&mut out, 0, values.len());
        assert_eq!(out, values);
    }

    #[test]
    fn add_node_prefix_and_suffix_interleaved() {
        let shape = Shape::new(4, 4);
        let mut builder = Builder::<i32, DenseAdapter<i32>>::new(shape, std::sync::Arc::new(()));
        builder.push_run(&[3, 4]);
        builder.add_node(leaf_of(&[5, 6]), false);
        builder.add_node(leaf_of(&[1, 2]), true);
        let root = builder.close(true).expect("close should succeed");
        let mut out = [0; 6];
        root.fill(&mut out, 0, 6);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    fn leaf_of(values: &[i32]) -> Child<i32, DenseAdapter<i32>> {
        use crate::leaf::Leaf;
        let mut leaf = Leaf::<i32, DenseAdapter<i32>>::create(&(), 4);
        leaf.append(values, false);
        Child::MutLeaf(Box::new(leaf))
    }

    #[test]
    fn close_prunes_single_child_spine() {
        let shape = Shape::new(2, 2);
        let mut builder = Builder::<i32, DenseAdapter<i32>>::new(shape, std::sync::Arc::new(()));
        for v in 0..9 {
            builder.push(v);
        }
        let root = builder.close(true).expect("close should succeed");
        assert_eq!(root.size(), 9);
        if let Child::FrozenBNode(b) = &root {
            assert!(b.children_count() > 1, "root should not be a pruned single-child spine");
        }
    }

    #[test]
    fn add_node_range_extracts_a_window_spanning_several_children() {
        let shape = Shape::new(4, 4);
        let mut source = Builder::<i32, DenseAdapter<i32>>::new(shape, std::sync::Arc::new(()));
        let values: Vec<i32> = (0..40).collect();
        source.push_run(&values);
        let root = source.close(true).expect("close should succeed");

        let mut builder = Builder::<i32, DenseAdapter<i32>>::new(shape, std::sync::Arc::new(()));
        builder.add_node_range(&root, 6, 20, false);
        let extracted = builder.close(true).expect("close should succeed");

        assert_eq!(extracted.size(), 20);
        let mut out = vec![0; 20];
        extracted.fill(&mut out, 0, 20);
        assert_eq!(out, values[6..26]);
    }

    #[test]
    fn add_node_range_on_a_single_leaf_shares_the_same_frozen_storage() {
        use crate::storage::{DenseAdapter as Adapter, LeafStorageAdapter};

        let shape = Shape::new(16, 4);
        let mut leaf = crate::leaf::Leaf::<i32, Adapter<i32>>::create(&(), 16);
        leaf.append(&[1, 2, 3, 4, 5, 6], false);
        let root = Child::FrozenLeaf(std::sync::Arc::new(leaf.make_const()));
        let Child::FrozenLeaf(original) = &root else {
            unreachable!()
        };
        let original_identity = Adapter::<i32>::identity(original.storage_for_test());

        let mut builder = Builder::<i32, Adapter<i32>>::new(shape, std::sync::Arc::new(()));
        builder.add_node_range(&root, 1, 3, false);
        let extracted = builder.close(true).expect("close should succeed");

        let Child::FrozenLeaf(sliced) = &extracted else {
            panic!("slicing within one leaf should stay a leaf");
        };
        assert_eq!(
            Adapter::<i32>::identity(sliced.storage_for_test()),
            original_identity,
            "a window inside one leaf should share the same frozen storage, not copy it"
        );
        let mut out = [0; 3];
        extracted.fill(&mut out, 0, 3);
        assert_eq!(out, [2, 3, 4]);
    }
}
