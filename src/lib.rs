// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An in-memory, persistent (copy-on-write) ordered sequence: a rope built
//! over fixed-size leaves, with a B-tree of annotated overlay nodes above
//! them.
//!
//! ##### About
//!
//! A [`Sequence`] holds an ordered run of elements the way a `Vec` does, but
//! supports O(log n) slicing, concatenation, and partial overwrite, all
//! without mutating any version another [`Sequence`] handle might still be
//! reading. Structural sharing between versions is automatic: two sequences
//! that diverge from a common edit still share every subtree neither one
//! touched.
//!
//! The tree has three node kinds:
//!
//! - [`leaf::Leaf`] — a fixed-capacity window over caller-supplied backing
//!   storage (see [`storage::LeafStorageAdapter`]).
//! - [`node::bnode::BNode`] — an ordinary B-tree inner node with cumulative
//!   child sizes for O(log `MAX`) positional lookup.
//! - [`node::anode::ANode`] — an annotated overlay node: an immutable frozen
//!   subtree plus a small ordered list of overlay windows that shadow parts
//!   of it, used to keep sparse random-access overwrites from forcing a full
//!   copy of the subtree underneath.
//!
//! [`Builder`] is the incremental constructor used internally by every
//! [`Sequence`] mutation; it maintains one open, exclusively-mutable seam
//! from the tree's root down to wherever the current edit is happening, and
//! splices already-built subtrees in alongside it.
//!
//! # Example usage
//!
//! ```
//! use seqtree::{DenseAdapter, Sequence, Shape};
//!
//! let shape = Shape::new(16, 4);
//! let mut seq = Sequence::<i32, DenseAdapter<i32>>::from_slice(shape, &(), &[1, 2, 3, 4, 5]);
//! assert_eq!(seq.len(), 5);
//! assert_eq!(seq.get(2), 3);
//!
//! let tail = seq.slice(2, 3);
//! assert_eq!(tail.len(), 3);
//!
//! seq.overwrite(0, &[9, 9]);
//! assert_eq!(seq.get(0), 9);
//! // `tail` is unaffected by edits made through `seq` after it was sliced off.
//! assert_eq!(tail.get(0), 3);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

pub mod allocator;
mod binary_search;
pub mod builder;
#[doc(hidden)]
pub mod collaborators;
mod error;
pub mod leaf;
pub mod node;
mod sequence;
pub mod shape;
pub mod storage;

pub use builder::Builder;
pub use error::{Error, Result};
pub use leaf::Leaf;
pub use sequence::Sequence;
pub use shape::Shape;
pub use storage::{DenseAdapter, DenseStorage, IndexAdapter, IndexContext, LeafStorageAdapter};
