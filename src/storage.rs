// Copyright (c) 2024-present, seqtree contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The leaf storage-adapter interface and its two concrete policies.
//!
//! A [`Leaf`](crate::leaf::Leaf) never touches raw bytes itself; every
//! read/write/copy/freeze/thaw goes through a `LeafStorageAdapter`. This is
//! the seam that lets the same balancing/sharing machinery back either a
//! plain dense array of `T` or an index into an external block space (the
//! mechanism the out-of-scope `DataFrameSpace` collaborator would plug
//! into).

use std::sync::Arc;

/// Storage policy for leaf elements, implemented by callers who want to
/// plug in a new backing store.
///
/// `Storage` carries its own mutable/frozen state; `is_mutable` reports
/// which. Freezing/thawing are adapter-defined because only the adapter
/// knows how its storage is physically shared (an `Arc<[T]>` for the dense
/// case, a block-space handle for the index case).
pub trait LeafStorageAdapter<T>: Sized {
    /// Adapter-defined backing storage for one leaf's window.
    type Storage: Clone;
    /// Opaque, caller-supplied handle threaded through every operation.
    /// `()` for the dense adapter; an allocation session for the index
    /// adapter.
    type Context;

    /// Creates storage for a fresh, empty, mutable leaf of `capacity`.
    fn create_leaf(ctx: &Self::Context, capacity: usize) -> Self::Storage;

    fn at(storage: &Self::Storage, pos: usize) -> T;
    fn set_at(storage: &mut Self::Storage, pos: usize, value: T);

    /// Copies `len` elements from `(src, src_off)` into `(dest, dest_off)`.
    fn copy(dest: &mut Self::Storage, dest_off: usize, src: &Self::Storage, src_off: usize, len: usize);

    /// Bulk-reads `len` elements starting at `src_off` into `dest`.
    fn get_values(dest: &mut [T], src: &Self::Storage, src_off: usize, len: usize);

    /// Bulk-writes `len` elements from `src` starting at `dest_off`.
    fn set_values(dest: &mut Self::Storage, dest_off: usize, src: &[T], len: usize);

    /// Moves `len` elements within the same storage, `from` -> `to`.
    fn shift_data(storage: &mut Self::Storage, from: usize, to: usize, len: usize);

    /// Thaws frozen storage into an exclusive mutable copy.
    fn mutate(storage: &Self::Storage, ctx: &Self::Context) -> Self::Storage;

    /// Freezes mutable storage into a shareable, immutable form. Cheap
    /// (O(1)) once the adapter hands ownership to its shared-owner type.
    fn make_const(storage: Self::Storage) -> Self::Storage;

    fn is_mutable(storage: &Self::Storage) -> bool;

    /// Whether this storage represents "no data" (used by adapters whose
    /// `Storage` has a null state, e.g. an as-yet-unassigned index leaf).
    fn is_null(_storage: &Self::Storage) -> bool {
        false
    }

    /// Cheap identity token: two storages that return equal tokens are
    /// backed by the same physical allocation. Used by `ANode` to detect
    /// fuse-in-place opportunities and by the sharing property tests.
    fn identity(storage: &Self::Storage) -> Option<usize>;
}

/// The normal case: storage is an owned buffer while mutable, or a
/// reference-counted shared buffer once frozen. Slots are `Option<T>`
/// rather than bare `T` so a leaf's backing buffer can grow (via append,
/// shift, or a front-inserting prefix) without requiring `T: Default`;
/// any slot within a live leaf's window is always `Some` by construction.
#[derive(Clone)]
pub enum DenseStorage<T> {
    Mutable(Vec<Option<T>>),
    Frozen(Arc<Vec<Option<T>>>),
}

impl<T: Clone> DenseStorage<T> {
    fn slot(&self, pos: usize) -> &T {
        let v = match self {
            Self::Mutable(v) => v,
            Self::Frozen(v) => v,
        };
        v[pos].as_ref().expect("read of a slot that was never written")
    }

    fn mutable_vec(&mut self) -> &mut Vec<Option<T>> {
        match self {
            Self::Mutable(v) => v,
            Self::Frozen(_) => panic!("ImmutableWrite: write through frozen dense storage"),
        }
    }

    fn ensure_len(v: &mut Vec<Option<T>>, len: usize) {
        if v.len() < len {
            v.resize_with(len, || None);
        }
    }
}

/// Dense array storage adapter.
pub struct DenseAdapter<T>(std::marker::PhantomData<T>);

impl<T: Clone> LeafStorageAdapter<T> for DenseAdapter<T> {
    type Storage = DenseStorage<T>;
    type Context = ();

    fn create_leaf(_ctx: &Self::Context, capacity: usize) -> Self::Storage {
        DenseStorage::Mutable(Vec::with_capacity(capacity))
    }

    fn at(storage: &Self::Storage, pos: usize) -> T {
        storage.slot(pos).clone()
    }

    fn set_at(storage: &mut Self::Storage, pos: usize, value: T) {
        let v = storage.mutable_vec();
        DenseStorage::<T>::ensure_len(v, pos + 1);
        v[pos] = Some(value);
    }

    fn copy(dest: &mut Self::Storage, dest_off: usize, src: &Self::Storage, src_off: usize, len: usize) {
        let values: Vec<T> = (0..len).map(|i| src.slot(src_off + i).clone()).collect();
        let v = dest.mutable_vec();
        DenseStorage::<T>::ensure_len(v, dest_off + len);
        for (i, value) in values.into_iter().enumerate() {
            v[dest_off + i] = Some(value);
        }
    }

    fn get_values(dest: &mut [T], src: &Self::Storage, src_off: usize, len: usize) {
        for i in 0..len {
            dest[i] = src.slot(src_off + i).clone();
        }
    }

    fn set_values(dest: &mut Self::Storage, dest_off: usize, src: &[T], len: usize) {
        let v = dest.mutable_vec();
        DenseStorage::<T>::ensure_len(v, dest_off + len);
        for (i, value) in src.iter().take(len).enumerate() {
            v[dest_off + i] = Some(value.clone());
        }
    }

    fn shift_data(storage: &mut Self::Storage, from: usize, to: usize, len: usize) {
        if from == to || len == 0 {
            return;
        }
        let v = storage.mutable_vec();
        DenseStorage::<T>::ensure_len(v, from.max(to) + len);
        if to > from {
            for i in (0..len).rev() {
                v[to + i] = v[from + i].clone();
            }
        } else {
            for i in 0..len {
                v[to + i] = v[from + i].clone();
            }
        }
    }

    fn mutate(storage: &Self::Storage, _ctx: &Self::Context) -> Self::Storage {
        match storage {
            DenseStorage::Mutable(v) => DenseStorage::Mutable(v.clone()),
            DenseStorage::Frozen(v) => DenseStorage::Mutable((**v).clone()),
        }
    }

    fn make_const(storage: Self::Storage) -> Self::Storage {
        match storage {
            DenseStorage::Mutable(v) => DenseStorage::Frozen(Arc::new(v)),
            frozen @ DenseStorage::Frozen(_) => frozen,
        }
    }

    fn is_mutable(storage: &Self::Storage) -> bool {
        matches!(storage, DenseStorage::Mutable(_))
    }

    fn identity(storage: &Self::Storage) -> Option<usize> {
        match storage {
            DenseStorage::Mutable(_) => None,
            DenseStorage::Frozen(v) => Some(Arc::as_ptr(v) as usize),
        }
    }
}

/// A row-identifier adapter: each element is a logical row id derived from
/// a block id plus an in-block offset, rather than a value stored inline.
/// This is the seam the out-of-scope `DataFrameSpace` collaborator would
/// plug a real block space into; here, `mutate` just allocates a fresh
/// session-local block id run rather than physically gathering rows, since
/// there is no block space in this core-only crate (see DESIGN.md).
#[derive(Clone)]
pub struct IndexLeaf {
    block_id: u64,
    /// Row ids present are `base + 0, base + 1, ..., base + len - 1`.
    base: u64,
    len: usize,
    mutable: bool,
}

/// Allocation session for [`IndexAdapter`]: a monotonically increasing
/// block-id counter, shared across all leaves created under one
/// [`crate::Builder`].
#[derive(Default)]
pub struct IndexContext {
    next_block_id: std::sync::atomic::AtomicU64,
}

impl IndexContext {
    fn next_block(&self) -> u64 {
        self.next_block_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

pub struct IndexAdapter;

impl LeafStorageAdapter<u64> for IndexAdapter {
    type Storage = IndexLeaf;
    type Context = IndexContext;

    fn create_leaf(ctx: &Self::Context, _capacity: usize) -> Self::Storage {
        IndexLeaf {
            block_id: ctx.next_block(),
            base: 0,
            len: 0,
            mutable: true,
        }
    }

    fn at(storage: &Self::Storage, pos: usize) -> u64 {
        assert!(pos < storage.len, "index leaf read out of bounds");
        (storage.block_id << 32) | (storage.base + pos as u64)
    }

    fn set_at(storage: &mut Self::Storage, pos: usize, _value: u64) {
        assert!(storage.mutable, "ImmutableWrite: set_at on frozen index leaf");
        storage.len = storage.len.max(pos + 1);
    }

    fn copy(dest: &mut Self::Storage, dest_off: usize, src: &Self::Storage, _src_off: usize, len: usize) {
        assert!(dest.mutable, "ImmutableWrite: copy into frozen index leaf");
        dest.len = dest.len.max(dest_off + len);
        let _ = src;
    }

    fn get_values(dest: &mut [u64], src: &Self::Storage, src_off: usize, len: usize) {
        for (i, slot) in dest.iter_mut().enumerate().take(len) {
            *slot = Self::at(src, src_off + i);
        }
    }

    fn set_values(dest: &mut Self::Storage, dest_off: usize, _src: &[u64], len: usize) {
        assert!(dest.mutable, "ImmutableWrite: set_values on frozen index leaf");
        dest.len = dest.len.max(dest_off + len);
    }

    fn shift_data(_storage: &mut Self::Storage, _from: usize, _to: usize, _len: usize) {
        // Row ids are derived arithmetically from `base`; shifting a
        // contiguous run within the same block is a no-op on the
        // identifiers themselves.
    }

    fn mutate(storage: &Self::Storage, ctx: &Self::Context) -> Self::Storage {
        // Thawing a frozen index leaf allocates a new block via the
        // session context rather than copying row ids in place; this is
        // what lets `DataFrameSpace` later physically gather the old
        // block's rows into the new one during compaction.
        IndexLeaf {
            block_id: ctx.next_block(),
            base: storage.base,
            len: storage.len,
            mutable: true,
        }
    }

    fn make_const(mut storage: Self::Storage) -> Self::Storage {
        storage.mutable = false;
        storage
    }

    fn is_mutable(storage: &Self::Storage) -> bool {
        storage.mutable
    }

    fn identity(storage: &Self::Storage) -> Option<usize> {
        if storage.mutable {
            None
        } else {
            Some(storage.block_id as usize)
        }
    }
}
