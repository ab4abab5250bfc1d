//! Invariant-style tests over the public [`seqtree::Sequence`] facade.

use proptest::prelude::*;
use seqtree::node::anode::{ANode, Origin};
use seqtree::node::bnode::BNode;
use seqtree::node::Child;
use seqtree::{Builder, DenseAdapter, Leaf, Sequence, Shape};
use std::sync::Arc;

fn shape() -> Shape {
    Shape::new(16, 4)
}

fn seq(values: &[i32]) -> Sequence<i32, DenseAdapter<i32>> {
    Sequence::from_slice(shape(), &(), values)
}

fn collect(s: &Sequence<i32, DenseAdapter<i32>>) -> Vec<i32> {
    let mut out = vec![0; s.len()];
    if !out.is_empty() {
        s.fill(&mut out, 0, out.len());
    }
    out
}

proptest! {
    /// Building a sequence from a slice and reading every element back in
    /// order reproduces the slice exactly, for any sequence length or
    /// content.
    #[test]
    fn round_trip_matches_the_source_slice(values in prop::collection::vec(any::<i32>(), 0..300)) {
        let s = seq(&values);
        prop_assert_eq!(s.len(), values.len());
        prop_assert_eq!(collect(&s), values);
    }

    /// Concatenation is associative on the flattened element order,
    /// regardless of how the three pieces are grouped.
    #[test]
    fn concat_is_associative(
        a in prop::collection::vec(any::<i32>(), 0..40),
        b in prop::collection::vec(any::<i32>(), 0..40),
        c in prop::collection::vec(any::<i32>(), 0..40),
    ) {
        let (sa, sb, sc) = (seq(&a), seq(&b), seq(&c));
        let left = sa.concat(&sb).concat(&sc);
        let right = sa.concat(&sb.concat(&sc));
        prop_assert_eq!(collect(&left), collect(&right));

        let mut expected = a.clone();
        expected.extend(b);
        expected.extend(c);
        prop_assert_eq!(collect(&left), expected);
    }

    /// Slicing twice in a row is the same as slicing once with the
    /// composed range.
    #[test]
    fn slice_composition_matches_a_single_equivalent_slice(
        values in prop::collection::vec(any::<i32>(), 1..200),
        seed1 in any::<u32>(),
        seed2 in any::<u32>(),
    ) {
        let s = seq(&values);
        let outer_off = (seed1 as usize) % values.len();
        let outer_len = 1 + (seed2 as usize) % (values.len() - outer_off);
        let once = s.slice(outer_off, outer_len);

        if outer_len > 1 {
            let inner_off = (seed2 as usize) % (outer_len - 1);
            let inner_len = outer_len - inner_off;
            let twice = once.slice(inner_off, inner_len);
            let composed = s.slice(outer_off + inner_off, inner_len);
            prop_assert_eq!(collect(&twice), collect(&composed));
        }
    }

    /// Overwriting a range changes exactly that range and nothing else.
    #[test]
    fn overwrite_touches_only_its_own_range(
        values in prop::collection::vec(any::<i32>(), 1..100),
        seed1 in any::<u32>(),
        seed2 in any::<u32>(),
        patch in prop::collection::vec(any::<i32>(), 0..20),
    ) {
        let len = values.len();
        let patch_len = patch.len().min(len);
        let patch = &patch[..patch_len];
        let offset = if patch_len == len { 0 } else { (seed1 as usize) % (len - patch_len + 1) };
        let _ = seed2;

        let mut s = seq(&values);
        s.overwrite(offset, patch);
        let after = collect(&s);

        let mut expected = values.clone();
        expected[offset..offset + patch_len].clone_from_slice(patch);
        prop_assert_eq!(after, expected);
    }

    /// A slice taken before an edit is unaffected by edits made afterward
    /// through the original handle (the copy-on-write sharing contract).
    #[test]
    fn earlier_slices_are_immune_to_later_edits(
        values in prop::collection::vec(any::<i32>(), 2..80),
        edit in prop::collection::vec(any::<i32>(), 1..10),
    ) {
        let mut s = seq(&values);
        let before = s.slice(0, values.len());
        let edit_len = edit.len().min(values.len());
        s.overwrite(0, &edit[..edit_len]);

        prop_assert_eq!(collect(&before), values);
        prop_assert_ne!(collect(&s), values);
    }
}

// Two single-element leaves concatenated fuse into one frozen leaf, in
// order, balanced only once its length clears half the shape's leaf
// capacity.
#[test]
fn two_small_leaves_concat_into_one_leaf() {
    let small_shape = Shape::new(4, 4);
    let s1 = Sequence::<i32, DenseAdapter<i32>>::from_slice(small_shape, &(), &[10]);
    let s2 = Sequence::<i32, DenseAdapter<i32>>::from_slice(small_shape, &(), &[20]);
    let merged = s1.concat(&s2);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.height(), 0);
    assert_eq!(collect(&merged), vec![10, 20]);
    // a length-2 leaf is balanced (len >= capacity/2) exactly when capacity <= 4
    assert_eq!(merged.len() >= small_shape.s / 2, small_shape.s <= 4);
}

// A small leading fragment prepended to a near-full trailing fragment,
// drawn from two unrelated origin leaves, still fuses into a single
// ordered leaf rather than a two-child BNode.
#[test]
fn small_prefix_and_large_suffix_fuse_into_one_leaf() {
    let s = shape();
    let p1: Vec<i32> = (0..s.s - 2).map(|i| 7 + 3 * i as i32).collect();
    let p2: Vec<i32> = (0..s.s).map(|i| 20 + 7 * i as i32).collect();

    let p1_seq = Sequence::<i32, DenseAdapter<i32>>::from_slice(s, &(), &p1);
    let p2_seq = Sequence::<i32, DenseAdapter<i32>>::from_slice(s, &(), &p2);

    let prefix = p1_seq.slice(1, 1);
    let suffix = p2_seq.slice(1, s.s - 2);
    let combined = prefix.concat(&suffix);

    let mut expected = collect(&prefix);
    expected.extend(collect(&suffix));
    assert_eq!(combined.len(), expected.len());
    assert_eq!(collect(&combined), expected);
    assert_eq!(combined.height(), 0, "a fragment this small should stay a single leaf");
}

// A BNode built from MAX identical, already-frozen leaves is deep-balanced
// and `make_const` does not reallocate any child already frozen: every
// child keeps its `Arc` identity across the call.
#[test]
fn bnode_of_max_frozen_leaves_is_deep_balanced_and_make_const_is_pointer_stable() {
    let s = shape();
    let mut node = BNode::<i32, DenseAdapter<i32>>::new(s, 1);
    for block in 0..s.max {
        let mut leaf = Leaf::<i32, DenseAdapter<i32>>::create(&(), s.s);
        let values: Vec<i32> = (0..s.s).map(|i| (block * s.s + i) as i32).collect();
        leaf.append(&values, false);
        node.add_node(Child::FrozenLeaf(Arc::new(leaf.make_const())), false);
    }
    assert_eq!(node.size(), s.max * s.s);
    assert!(node.is_deep_balanced(true));
    assert!(node.is_deep_balanced(false));

    let before: Vec<*const Leaf<i32, DenseAdapter<i32>>> = (0..node.children_count())
        .map(|i| {
            let Child::FrozenLeaf(arc) = node.child_at(i) else {
                panic!("every child should already be a frozen leaf");
            };
            Arc::as_ptr(arc)
        })
        .collect();

    let frozen = node.make_const();
    let after: Vec<*const Leaf<i32, DenseAdapter<i32>>> = (0..frozen.children_count())
        .map(|i| {
            let Child::FrozenLeaf(arc) = frozen.child_at(i) else {
                panic!("every child should still be a frozen leaf");
            };
            Arc::as_ptr(arc)
        })
        .collect();
    assert_eq!(before, after, "make_const should not reallocate children already frozen");
}

// An ANode overlaying a frozen BNode origin reads the overlay wherever it
// covers the origin and falls through to the origin everywhere else; once
// the overlay root is pushed back down through a `Builder` with
// `allow_annotated_root = false`, the flattened plain tree reads back
// identically.
#[test]
fn anode_overlay_reads_shadow_the_origin_and_survive_push_down() {
    let s = shape();
    let mut origin_node = BNode::<i32, DenseAdapter<i32>>::new(s, 1);
    for block in 0..s.max {
        let mut leaf = Leaf::<i32, DenseAdapter<i32>>::create(&(), s.s);
        let values: Vec<i32> = (0..s.s).map(|i| (block * s.s + i) as i32).collect();
        leaf.append(&values, false);
        origin_node.add_node(Child::FrozenLeaf(Arc::new(leaf.make_const())), false);
    }
    let origin_size = origin_node.size();
    let origin = Arc::new(origin_node.make_const());

    let overlay_offset = s.s / 2;
    let overlay_len = s.max;
    let mut overlay_leaf = Leaf::<i32, DenseAdapter<i32>>::create(&(), overlay_len);
    let overlay_values: Vec<i32> = vec![-1; overlay_len];
    overlay_leaf.append(&overlay_values, false);
    let overlay = Child::FrozenLeaf(Arc::new(overlay_leaf.make_const()));

    let mut anode = ANode::<i32, DenseAdapter<i32>>::new(s, Origin::BNode(Arc::clone(&origin)));
    assert!(anode.can_accept(overlay_offset, overlay_len, 0));
    anode.add_node(overlay, overlay_offset, overlay_len);
    assert_eq!(anode.overlay_count(), 1);

    let mut expected = vec![0; origin_size];
    origin.fill(&mut expected, 0, origin_size);
    for v in &mut expected[overlay_offset..overlay_offset + overlay_len] {
        *v = -1;
    }
    let mut actual = vec![0; origin_size];
    anode.fill(&mut actual, 0, origin_size);
    assert_eq!(actual, expected);

    let mut builder = Builder::<i32, DenseAdapter<i32>>::new(s, Arc::new(()));
    builder.add_node(Child::FrozenANode(Arc::new(anode)), false);
    let pushed_down = builder.close(false).expect("push-down should always succeed here");
    assert!(
        !matches!(pushed_down, Child::FrozenANode(_)),
        "allow_annotated_root = false must never hand back an ANode root"
    );
    let mut flattened = vec![0; origin_size];
    pushed_down.fill(&mut flattened, 0, origin_size);
    assert_eq!(flattened, expected);
}

// Inserting a single value at the same logical position, over and over,
// lands exactly there each time and leaves every untouched element exactly
// where it started (slice + concat emulating an insert-at-middle).
#[test]
fn repeated_insert_at_the_same_position_preserves_surrounding_order() {
    let values: Vec<i32> = (0..5000).collect();
    let mut s = seq(&values);
    let insert_at = 2500;

    for _ in 0..10 {
        let head = s.slice(0, insert_at);
        let tail = s.slice(insert_at, s.len() - insert_at);
        let marker = Sequence::<i32, DenseAdapter<i32>>::from_slice(shape(), &(), &[-1]);
        s = head.concat(&marker).concat(&tail);
    }

    assert_eq!(s.len(), values.len() + 10);
    for i in 0..10 {
        assert_eq!(s.get(insert_at + i), -1, "each of the 10 inserts should read back as the marker");
    }
    for i in 0..insert_at {
        assert_eq!(s.get(i), values[i], "elements before the insertion point are untouched");
    }
    for i in insert_at + 10..s.len() {
        assert_eq!(s.get(i), values[i - 10], "elements after the insertion point keep their original value, just shifted");
    }
}

// Many scattered single-element overwrites build up overlay segments on an
// ANode; once they exceed `MAX`, `compact` either folds them back down or
// reports `Full` rather than growing the overlay count without bound.
#[test]
fn sparse_overwrites_either_compact_or_report_full() {
    let s = shape();
    let mut leaf = Leaf::<i32, DenseAdapter<i32>>::create(&(), s.s);
    let base: Vec<i32> = (0..s.s).map(|i| i as i32).collect();
    leaf.append(&base, false);
    let origin = Arc::new(leaf.make_const());

    let mut anode = ANode::<i32, DenseAdapter<i32>>::new(s, Origin::Leaf(Arc::clone(&origin)));
    let stride = (s.s / (s.max + 2)).max(1);
    let mut touched = 0;
    for i in (0..s.s).step_by(stride.max(1)) {
        if !anode.can_accept(i, 1, 0) {
            continue;
        }
        let mut overlay_leaf = Leaf::<i32, DenseAdapter<i32>>::create(&(), 1);
        overlay_leaf.append(&[-(i as i32) - 1], false);
        anode.add_node(Child::FrozenLeaf(Arc::new(overlay_leaf.make_const())), i, 1);
        touched += 1;
    }
    assert!(touched > 0, "the stride should land inside the leaf's overlay window at least once");

    if anode.can_compact() {
        let before = anode.overlay_count();
        match anode.compact() {
            Ok(()) => assert!(anode.overlay_count() <= before, "a successful compact never grows the overlay count"),
            Err(seqtree::Error::Full) => {}
            Err(other) => panic!("unexpected compaction error: {other:?}"),
        }
    }
}
